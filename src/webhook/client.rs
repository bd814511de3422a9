//! HTTP client for the editor extension's webhook endpoint.
//!
//! Expected failure modes never surface as `Err`: submissions resolve to a
//! [`SendResult`] with a structured error code, and probes resolve to
//! `Option` (`None` meaning "unreachable"). Callers that want to know *why*
//! a probe failed can raise the log level.

use crate::webhook::protocol::{
    self, error_codes, evaluate_readiness, PollOptions, PollOutcome, PollStatus, PromptRequest,
    QueueStatus, Readiness, RequestStatus, RequestStatusResponse, SendResult, ServerHealth,
    StatusProbe, WebhookPayload, WorkspaceReadiness,
};
use crate::DeskhookConfig;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Bounded busy-wait defaults for `wait_until_chat_free`
const CHAT_FREE_POLLS: u32 = 15;
const CHAT_FREE_INTERVAL: Duration = Duration::from_secs(1);

/// HTTP client for the webhook endpoint.
///
/// Construct one per process and inject it where needed; there is no global
/// instance, so tests can point a client at a fake server.
pub struct WebhookClient {
    http: Client,
    webhook_url: String,
    server_root: String,
    request_timeout: Duration,
    probe_timeout: Duration,
    stuck_threshold: Duration,
}

impl WebhookClient {
    pub fn new(config: &DeskhookConfig) -> Self {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("deskhook/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            http,
            server_root: protocol::derive_server_root(&config.webhook_url),
            webhook_url: config.webhook_url.clone(),
            request_timeout: config.request_timeout,
            probe_timeout: config.probe_timeout,
            stuck_threshold: config.stuck_threshold,
        }
    }

    pub fn webhook_url(&self) -> &str {
        &self.webhook_url
    }

    // ─── Submissions ────────────────────────────────────────────────

    /// Submit a prompt with optional context to the assistant.
    pub async fn send_prompt(&self, prompt: &str, context: Option<&str>) -> SendResult {
        let body = PromptRequest { prompt, context };
        self.post_normalized(&self.webhook_url, &body).await
    }

    /// Submit a legacy generic action envelope.
    pub async fn send_webhook(&self, payload: &WebhookPayload) -> SendResult {
        self.post_normalized(&self.webhook_url, payload).await
    }

    /// Connectivity test against `POST {root}/test`, echoing a
    /// client-identifying payload.
    pub async fn test_connection(&self) -> SendResult {
        let body = serde_json::json!({
            "client": "deskhook",
            "version": env!("CARGO_PKG_VERSION"),
        });
        let url = format!("{}/test", self.server_root);
        self.post_normalized(&url, &body).await
    }

    async fn post_normalized<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> SendResult {
        let sent = self
            .http
            .post(url)
            .json(body)
            .timeout(self.request_timeout)
            .send()
            .await;

        match sent {
            Ok(response) => Self::normalize_response(response).await,
            Err(e) => self.normalize_transport_error(e),
        }
    }

    /// Map an HTTP response onto the single typed result shape. The server
    /// uses distinct status codes for domain errors (400 missing prompt,
    /// 503 no workspace / unavailable) and may carry a structured body on
    /// any of them.
    async fn normalize_response(response: reqwest::Response) -> SendResult {
        let status = response.status();
        let body = response.json::<protocol::WebhookResponse>().await.ok();

        if status.is_success() {
            return match body {
                Some(parsed) => SendResult::from_response(parsed),
                None => SendResult::failure(
                    error_codes::UNKNOWN_ERROR,
                    "Extension returned an unreadable response body",
                ),
            };
        }

        let default_code = match status {
            StatusCode::BAD_REQUEST => error_codes::MISSING_PROMPT,
            StatusCode::SERVICE_UNAVAILABLE => error_codes::SERVICE_UNAVAILABLE,
            _ => error_codes::REQUEST_FAILED,
        };

        match body {
            Some(parsed) => {
                let code = parsed
                    .error
                    .clone()
                    .unwrap_or_else(|| default_code.to_string());
                let message = parsed
                    .message
                    .clone()
                    .unwrap_or_else(|| format!("Extension answered HTTP {}", status.as_u16()));
                SendResult {
                    success: false,
                    message: Some(message),
                    request_id: parsed.request_id,
                    status: None,
                    queue_position: None,
                    error: Some(code),
                    suggestions: parsed.suggestions.unwrap_or_default(),
                    action_required: parsed.action_required,
                }
            }
            None => SendResult::failure(
                default_code,
                format!("Extension answered HTTP {}", status.as_u16()),
            ),
        }
    }

    fn normalize_transport_error(&self, e: reqwest::Error) -> SendResult {
        if e.is_timeout() {
            debug!("Webhook request timed out: {}", e);
            SendResult::timeout(self.request_timeout)
        } else if e.is_connect() {
            debug!("Webhook connection failed: {}", e);
            SendResult::connection_error(format!("Cannot reach extension: {}", e))
        } else {
            debug!("Webhook transport error: {}", e);
            SendResult::connection_error(e.to_string())
        }
    }

    // ─── Health & readiness ─────────────────────────────────────────

    /// `GET {root}/health`. Returns `None` on ANY failure; callers must
    /// treat `None` as "extension unreachable".
    pub async fn get_health(&self) -> Option<ServerHealth> {
        self.probe_json(&format!("{}/health", self.server_root)).await
    }

    /// `GET {root}/queue`. Returns `None` on any failure.
    pub async fn get_queue_status(&self) -> Option<QueueStatus> {
        self.probe_json(&format!("{}/queue", self.server_root)).await
    }

    async fn probe_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Option<T> {
        let response = self
            .http
            .get(url)
            .timeout(self.probe_timeout)
            .send()
            .await
            .map_err(|e| debug!("Probe {} failed: {}", url, e))
            .ok()?;

        if !response.status().is_success() {
            debug!("Probe {} answered HTTP {}", url, response.status().as_u16());
            return None;
        }

        response
            .json::<T>()
            .await
            .map_err(|e| debug!("Probe {} returned unreadable body: {}", url, e))
            .ok()
    }

    /// Boolean readiness summary. Never fails.
    pub async fn check_workspace_ready(&self) -> WorkspaceReadiness {
        match self.get_health().await {
            Some(health) => WorkspaceReadiness {
                connected: true,
                workspace_ready: health.workspace.ready,
                chat_busy: health.chat.busy,
            },
            None => WorkspaceReadiness {
                connected: false,
                workspace_ready: false,
                chat_busy: false,
            },
        }
    }

    /// Readiness decision with the stuck-chat override. A busy flag with no
    /// activity for longer than the configured threshold is overridden to
    /// not-busy; the override is logged so the heuristic stays observable.
    pub async fn is_ready(&self) -> Readiness {
        let health = self.get_health().await;
        let readiness = evaluate_readiness(health.as_ref(), self.stuck_threshold, Utc::now());
        if readiness.stuck_detected {
            warn!(
                "Chat reported busy but inactive for over {}s; treating as stuck and overriding",
                self.stuck_threshold.as_secs()
            );
        }
        readiness
    }

    /// Poll health until the chat is free, bounded at 15 polls of 1s.
    /// Returns false when the cap is exhausted or when waiting cannot help
    /// (unreachable, offline, no workspace).
    pub async fn wait_until_chat_free(&self) -> bool {
        self.wait_until_chat_free_with(CHAT_FREE_POLLS, CHAT_FREE_INTERVAL)
            .await
    }

    pub async fn wait_until_chat_free_with(&self, max_polls: u32, interval: Duration) -> bool {
        for attempt in 0..max_polls {
            if attempt > 0 {
                tokio::time::sleep(interval).await;
            }

            let Some(health) = self.get_health().await else {
                return false;
            };
            let readiness = evaluate_readiness(Some(&health), self.stuck_threshold, Utc::now());
            if readiness.ready {
                if readiness.stuck_detected {
                    warn!("Busy flag went stale while waiting; proceeding");
                }
                return true;
            }
            // Only a busy chat can clear on its own; anything else is a hard stop
            if !health.workspace.ready || health.status == protocol::HealthStatus::Offline {
                return false;
            }
            debug!("Chat busy, waiting ({}/{})", attempt + 1, max_polls);
        }
        false
    }

    // ─── Request status ─────────────────────────────────────────────

    /// `GET {root}/webhook/{id}/status`. A 404 is terminal: the extension
    /// most likely restarted and has no memory of the request.
    pub async fn get_request_status(&self, request_id: &str) -> StatusProbe {
        let url = format!("{}/webhook/{}/status", self.server_root, request_id);
        let response = match self.http.get(&url).timeout(self.probe_timeout).send().await {
            Ok(r) => r,
            Err(e) => return StatusProbe::Unreachable(e.to_string()),
        };

        match response.status() {
            StatusCode::NOT_FOUND => StatusProbe::NotFound,
            status if status.is_success() => match response.json::<RequestStatusResponse>().await {
                Ok(parsed) => StatusProbe::Status(parsed),
                Err(e) => StatusProbe::Unreachable(format!("unreadable status body: {}", e)),
            },
            status => StatusProbe::Unreachable(format!("HTTP {}", status.as_u16())),
        }
    }

    /// Bounded linear poll of a request's status.
    ///
    /// Short-circuits on `completed`/`failed`, terminates on 404, and
    /// returns a `timeout` outcome after exactly `max_attempts` polls
    /// otherwise. `on_status_change` is invoked once per observed status,
    /// including the final one; probes that fail to reach the server observe
    /// nothing and do not invoke it.
    pub async fn poll_for_completion<F>(
        &self,
        request_id: &str,
        options: PollOptions,
        mut on_status_change: F,
    ) -> PollOutcome
    where
        F: FnMut(RequestStatus),
    {
        for attempt in 0..options.max_attempts {
            if attempt > 0 {
                tokio::time::sleep(options.interval).await;
            }

            match self.get_request_status(request_id).await {
                StatusProbe::Status(observed) => {
                    on_status_change(observed.status);
                    match observed.status {
                        RequestStatus::Completed => {
                            return PollOutcome {
                                completed: true,
                                status: PollStatus::Completed,
                                error: None,
                            }
                        }
                        RequestStatus::Failed => {
                            return PollOutcome {
                                completed: false,
                                status: PollStatus::Failed,
                                error: observed.error.or(observed.message),
                            }
                        }
                        RequestStatus::Queued | RequestStatus::Processing => {}
                    }
                }
                StatusProbe::NotFound => {
                    return PollOutcome {
                        completed: false,
                        status: PollStatus::NotFound,
                        error: Some(
                            "Request not found; the extension may have restarted".to_string(),
                        ),
                    }
                }
                StatusProbe::Unreachable(detail) => {
                    debug!(
                        "Status probe {}/{} unreachable: {}",
                        attempt + 1,
                        options.max_attempts,
                        detail
                    );
                }
            }
        }

        PollOutcome {
            completed: false,
            status: PollStatus::Timeout,
            error: None,
        }
    }
}
