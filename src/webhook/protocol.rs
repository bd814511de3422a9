//! Wire types for the editor extension's webhook endpoint.
//!
//! The extension serves JSON with camelCase field names; rename attributes
//! keep the Rust side idiomatic. Expected failures are data, not errors:
//! every submission normalizes into a [`SendResult`] carrying one of the
//! structured codes in [`error_codes`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Structured error codes carried by [`SendResult::error`].
pub mod error_codes {
    /// HTTP 400: the request body had no prompt
    pub const MISSING_PROMPT: &str = "MISSING_PROMPT";
    /// HTTP 503: no workspace open in the editor
    pub const NO_WORKSPACE: &str = "NO_WORKSPACE";
    /// HTTP 503: extension up but unable to accept work
    pub const SERVICE_UNAVAILABLE: &str = "SERVICE_UNAVAILABLE";
    /// Any other non-2xx response
    pub const REQUEST_FAILED: &str = "REQUEST_FAILED";
    /// Client-side timeout hit before the server answered
    pub const TIMEOUT: &str = "TIMEOUT";
    /// Could not reach the extension at all
    pub const CONNECTION_ERROR: &str = "CONNECTION_ERROR";
    /// Response arrived but could not be understood
    pub const UNKNOWN_ERROR: &str = "UNKNOWN_ERROR";
}

/// Server-side operations accepted by the legacy generic envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookAction {
    ExecuteTask,
    CopilotChat,
    CreateFile,
    ModifyFile,
    RunCommand,
    QueryWorkspace,
}

/// Legacy generic request envelope for discrete actions.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    pub action: WebhookAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(rename = "filePath", skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

impl WebhookPayload {
    pub fn new(action: WebhookAction) -> Self {
        Self {
            action,
            task: None,
            prompt: None,
            file_path: None,
            content: None,
            command: None,
            query: None,
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_file_path(mut self, file_path: impl Into<String>) -> Self {
        self.file_path = Some(file_path.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }
}

/// Prompt submission body for the primary path.
#[derive(Debug, Clone, Serialize)]
pub struct PromptRequest<'a> {
    pub prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<&'a str>,
}

/// Where a queued request currently sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestPhase {
    Queued,
    Processing,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueuePlacement {
    pub position: u32,
}

/// Raw response body from the webhook endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(rename = "requestId", default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub status: Option<RequestPhase>,
    #[serde(default)]
    pub queue: Option<QueuePlacement>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub suggestions: Option<Vec<String>>,
    #[serde(default)]
    pub action_required: Option<String>,
}

/// Normalized outcome of any submission. Exactly one terminal class per
/// request: success, structured failure, or transport failure/timeout.
#[derive(Debug, Clone)]
pub struct SendResult {
    pub success: bool,
    pub message: Option<String>,
    pub request_id: Option<String>,
    pub status: Option<RequestPhase>,
    pub queue_position: Option<u32>,
    /// Structured code from [`error_codes`] when `success` is false
    pub error: Option<String>,
    /// Server-supplied remediation hints, preserved verbatim
    pub suggestions: Vec<String>,
    pub action_required: Option<String>,
}

impl SendResult {
    pub fn from_response(response: WebhookResponse) -> Self {
        let queue_position = response.queue.as_ref().map(|q| q.position);
        Self {
            success: response.success,
            message: response.message,
            request_id: response.request_id,
            status: response.status,
            queue_position,
            error: response.error,
            suggestions: response.suggestions.unwrap_or_default(),
            action_required: response.action_required,
        }
    }

    pub fn failure(code: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            request_id: None,
            status: None,
            queue_position: None,
            error: Some(code.to_string()),
            suggestions: Vec::new(),
            action_required: None,
        }
    }

    pub fn timeout(timeout: Duration) -> Self {
        Self::failure(
            error_codes::TIMEOUT,
            format!("Request timed out after {}s", timeout.as_secs()),
        )
    }

    pub fn connection_error(detail: impl Into<String>) -> Self {
        Self::failure(error_codes::CONNECTION_ERROR, detail)
    }

    /// Whether the request was accepted but parked behind other work.
    pub fn is_queued(&self) -> bool {
        self.status == Some(RequestPhase::Queued) || self.queue_position.is_some()
    }
}

// ─── Health ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
    Offline,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkspaceHealth {
    #[serde(default)]
    pub ready: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatHealth {
    #[serde(default)]
    pub busy: bool,
    /// Epoch milliseconds of the chat's last observed activity
    #[serde(rename = "lastActivity", default)]
    pub last_activity: Option<i64>,
}

/// Polled snapshot from `GET {root}/health`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerHealth {
    pub status: HealthStatus,
    #[serde(default)]
    pub workspace: WorkspaceHealth,
    #[serde(default)]
    pub chat: ChatHealth,
}

/// Three-field readiness summary from `check_workspace_ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkspaceReadiness {
    pub connected: bool,
    pub workspace_ready: bool,
    pub chat_busy: bool,
}

/// Readiness decision from `is_ready`, with the stuck-chat override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readiness {
    pub ready: bool,
    /// Why not, when `ready` is false; suitable for direct display
    pub reason: Option<String>,
    /// The busy flag was stale and got overridden
    pub stuck_detected: bool,
}

/// Derive a readiness decision from a health snapshot.
///
/// A chat reported busy whose `lastActivity` is older than `stuck_threshold`
/// is treated as stuck and overridden to not-busy. A busy chat with no
/// activity timestamp cannot be assessed and counts as genuinely busy.
pub fn evaluate_readiness(
    health: Option<&ServerHealth>,
    stuck_threshold: Duration,
    now: DateTime<Utc>,
) -> Readiness {
    let Some(health) = health else {
        return Readiness {
            ready: false,
            reason: Some("Extension is not reachable".to_string()),
            stuck_detected: false,
        };
    };

    if health.status == HealthStatus::Offline {
        return Readiness {
            ready: false,
            reason: Some("Extension reports itself offline".to_string()),
            stuck_detected: false,
        };
    }

    if !health.workspace.ready {
        return Readiness {
            ready: false,
            reason: Some("No workspace is open in the editor".to_string()),
            stuck_detected: false,
        };
    }

    if health.chat.busy {
        let inactive_ms = health
            .chat
            .last_activity
            .map(|last| now.timestamp_millis().saturating_sub(last));
        match inactive_ms {
            Some(ms) if ms > stuck_threshold.as_millis() as i64 => {
                // Stale busy flag: the chat stopped reporting activity long
                // ago, most likely a stuck state left behind by the editor.
                return Readiness {
                    ready: true,
                    reason: None,
                    stuck_detected: true,
                };
            }
            _ => {
                return Readiness {
                    ready: false,
                    reason: Some("Assistant chat is busy".to_string()),
                    stuck_detected: false,
                };
            }
        }
    }

    Readiness {
        ready: true,
        reason: None,
        stuck_detected: false,
    }
}

// ─── Queue ──────────────────────────────────────────────────────────

/// Snapshot from `GET {root}/queue`.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueStatus {
    #[serde(rename = "isProcessing", default)]
    pub is_processing: bool,
    #[serde(rename = "queueLength", default)]
    pub queue_length: u32,
    #[serde(rename = "currentTaskId", default)]
    pub current_task_id: Option<String>,
    #[serde(rename = "pendingTasks", default)]
    pub pending_tasks: Vec<String>,
}

// ─── Request status / polling ───────────────────────────────────────

/// Server-reported lifecycle of a submitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestStatusResponse {
    pub status: RequestStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// One status probe. A 404 is terminal: the extension most likely restarted
/// and forgot the request.
#[derive(Debug, Clone)]
pub enum StatusProbe {
    Status(RequestStatusResponse),
    NotFound,
    Unreachable(String),
}

/// Options for `poll_for_completion`. Linear polling, no backoff.
#[derive(Debug, Clone, Copy)]
pub struct PollOptions {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    Completed,
    Failed,
    NotFound,
    Timeout,
}

impl std::fmt::Display for PollStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::NotFound => write!(f, "not_found"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// Final outcome of a bounded poll.
#[derive(Debug, Clone)]
pub struct PollOutcome {
    pub completed: bool,
    pub status: PollStatus,
    pub error: Option<String>,
}

// ─── URL derivation ─────────────────────────────────────────────────

/// Server root for the health/queue/status/test endpoints: the webhook URL
/// with a trailing `/webhook` stripped.
pub fn derive_server_root(webhook_url: &str) -> String {
    let trimmed = webhook_url.trim_end_matches('/');
    trimmed
        .strip_suffix("/webhook")
        .unwrap_or(trimmed)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_server_root() {
        assert_eq!(
            derive_server_root("http://localhost:9090/webhook"),
            "http://localhost:9090"
        );
        assert_eq!(
            derive_server_root("http://localhost:9090/webhook/"),
            "http://localhost:9090"
        );
        // No /webhook suffix: used as-is
        assert_eq!(
            derive_server_root("http://localhost:9090"),
            "http://localhost:9090"
        );
    }

    #[test]
    fn test_response_parsing_preserves_structured_fields() {
        let body = r#"{
            "success": false,
            "error": "NO_WORKSPACE",
            "message": "No workspace folder is open",
            "suggestions": ["Open a folder", "Reload the window"],
            "action_required": "open_workspace"
        }"#;
        let response: WebhookResponse = serde_json::from_str(body).unwrap();
        let result = SendResult::from_response(response);

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some(error_codes::NO_WORKSPACE));
        assert_eq!(result.suggestions, vec!["Open a folder", "Reload the window"]);
        assert_eq!(result.action_required.as_deref(), Some("open_workspace"));
    }

    #[test]
    fn test_queued_response() {
        let body = r#"{
            "success": true,
            "requestId": "req-42",
            "status": "queued",
            "queue": {"position": 3}
        }"#;
        let response: WebhookResponse = serde_json::from_str(body).unwrap();
        let result = SendResult::from_response(response);

        assert!(result.success);
        assert!(result.is_queued());
        assert_eq!(result.queue_position, Some(3));
        assert_eq!(result.request_id.as_deref(), Some("req-42"));
    }

    #[test]
    fn test_readiness_unreachable() {
        let readiness = evaluate_readiness(None, Duration::from_secs(60), Utc::now());
        assert!(!readiness.ready);
        assert!(!readiness.stuck_detected);
        assert!(readiness.reason.is_some());
    }

    #[test]
    fn test_readiness_busy_fresh() {
        let now = Utc::now();
        let health = ServerHealth {
            status: HealthStatus::Ok,
            workspace: WorkspaceHealth { ready: true },
            chat: ChatHealth {
                busy: true,
                last_activity: Some(now.timestamp_millis() - 5_000),
            },
        };
        let readiness = evaluate_readiness(Some(&health), Duration::from_secs(60), now);
        assert!(!readiness.ready);
        assert!(!readiness.stuck_detected);
    }

    #[test]
    fn test_readiness_stuck_override() {
        let now = Utc::now();
        let health = ServerHealth {
            status: HealthStatus::Ok,
            workspace: WorkspaceHealth { ready: true },
            chat: ChatHealth {
                busy: true,
                last_activity: Some(now.timestamp_millis() - 70_000),
            },
        };
        let readiness = evaluate_readiness(Some(&health), Duration::from_secs(60), now);
        assert!(readiness.ready);
        assert!(readiness.stuck_detected);
    }

    #[test]
    fn test_readiness_busy_without_timestamp_counts_as_busy() {
        let health = ServerHealth {
            status: HealthStatus::Ok,
            workspace: WorkspaceHealth { ready: true },
            chat: ChatHealth {
                busy: true,
                last_activity: None,
            },
        };
        let readiness = evaluate_readiness(Some(&health), Duration::from_secs(60), Utc::now());
        assert!(!readiness.ready);
        assert!(!readiness.stuck_detected);
    }

    #[test]
    fn test_payload_skips_absent_fields() {
        let payload = WebhookPayload::new(WebhookAction::RunCommand).with_command("cargo check");
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["action"], "run_command");
        assert_eq!(json["command"], "cargo check");
        assert!(json.get("filePath").is_none());
        assert!(json.get("prompt").is_none());
    }
}
