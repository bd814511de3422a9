//! Action tracker - persisted history of outgoing requests.
//!
//! Every prompt submitted to the extension gets a record here, surviving
//! restarts so the history panel and retry both keep working. The whole
//! store is one JSON blob under a fixed storage key, loaded wholesale and
//! written back wholesale.

use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Storage key of the persisted blob. Part of the observable contract:
/// the history file is `{home}/devconsole-code-actions.json`.
pub const STORAGE_KEY: &str = "devconsole-code-actions";

/// Default capacity of the history (most recent kept).
pub const DEFAULT_CAPACITY: usize = 50;

/// Where a request originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionSource {
    Logs,
    StickyNotes,
    Manual,
}

impl std::fmt::Display for ActionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Logs => write!(f, "logs"),
            Self::StickyNotes => write!(f, "sticky-notes"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// Lifecycle status of a tracked action.
///
/// `Completed` exists only for backward compatibility with blobs written by
/// older clients; new records terminate in `SentToVscode`, `Failed` or
/// `CopiedFallback`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Queued,
    Sending,
    Processing,
    SentToVscode,
    Failed,
    CopiedFallback,
    Completed,
}

impl ActionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::SentToVscode | Self::Failed | Self::CopiedFallback | Self::Completed
        )
    }

    /// Terminal states that `clear_completed` sweeps away. Failed actions
    /// stay so they can be retried.
    pub fn is_success_or_fallback(&self) -> bool {
        matches!(self, Self::SentToVscode | Self::CopiedFallback | Self::Completed)
    }

    /// Valid transitions. Any terminal state may re-enter `Sending` (retry);
    /// a patch to the current status is a no-op and always valid.
    pub fn can_transition_to(&self, next: ActionStatus) -> bool {
        if *self == next {
            return true;
        }
        match self {
            Self::Sending => matches!(
                next,
                Self::Queued
                    | Self::Processing
                    | Self::SentToVscode
                    | Self::Failed
                    | Self::CopiedFallback
            ),
            Self::Queued => matches!(
                next,
                Self::Processing | Self::SentToVscode | Self::Failed | Self::Completed
            ),
            Self::Processing => {
                matches!(next, Self::SentToVscode | Self::Failed | Self::Completed)
            }
            // A delivered request can still fail while the editor processes it
            Self::SentToVscode => matches!(next, Self::Sending | Self::Failed),
            Self::Failed | Self::CopiedFallback | Self::Completed => next == Self::Sending,
        }
    }
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Sending => write!(f, "sending"),
            Self::Processing => write!(f, "processing"),
            Self::SentToVscode => write!(f, "sent_to_vscode"),
            Self::Failed => write!(f, "failed"),
            Self::CopiedFallback => write!(f, "copied_fallback"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// One tracked request. Field names mirror the persisted blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeAction {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub source: ActionSource,
    pub action_type: String,
    /// First line of the prompt, for list display
    pub preview: String,
    /// Full composed prompt text
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_count: Option<u32>,
    pub status: ActionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Input for `add_action`; id, timestamp and initial status are assigned by
/// the store.
#[derive(Debug, Clone)]
pub struct NewAction {
    pub source: ActionSource,
    pub action_type: String,
    pub prompt: String,
    pub image_count: Option<u32>,
}

/// Merge-patch for `update_action`. Absent fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ActionUpdate {
    pub status: Option<ActionStatus>,
    pub request_id: Option<String>,
    pub error: Option<String>,
    pub queue_position: Option<u32>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ActionUpdate {
    pub fn status(status: ActionStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(ActionStatus::Failed),
            error: Some(error.into()),
            completed_at: Some(Utc::now()),
            ..Default::default()
        }
    }
}

const PREVIEW_MAX_CHARS: usize = 120;

fn derive_preview(prompt: &str) -> String {
    let first_line = prompt.lines().next().unwrap_or("").trim();
    if first_line.chars().count() <= PREVIEW_MAX_CHARS {
        first_line.to_string()
    } else {
        let truncated: String = first_line.chars().take(PREVIEW_MAX_CHARS).collect();
        format!("{}…", truncated)
    }
}

/// Persisted action history, newest first.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ActionStore {
    #[serde(default)]
    actions: Vec<CodeAction>,

    #[serde(skip)]
    capacity: usize,

    #[serde(skip)]
    file_path: Option<PathBuf>,
}

impl ActionStore {
    /// Open the store at `file_path`, loading any existing blob. A blob that
    /// fails to parse is treated as absent rather than blocking startup.
    pub async fn new(file_path: PathBuf, capacity: usize) -> Result<Self> {
        let mut store = if file_path.exists() {
            let content = fs::read_to_string(&file_path).await?;
            match serde_json::from_str::<Self>(&content) {
                Ok(loaded) => loaded,
                Err(e) => {
                    warn!("Failed to parse {}: {}; starting empty", file_path.display(), e);
                    Self::default()
                }
            }
        } else {
            if let Some(parent) = file_path.parent() {
                fs::create_dir_all(parent).await?;
            }
            Self::default()
        };

        store.capacity = capacity.max(1);
        store.file_path = Some(file_path);
        store.actions.truncate(store.capacity);
        store.save().await?;
        Ok(store)
    }

    /// In-memory store (no persistence).
    pub fn in_memory(capacity: usize) -> Self {
        Self {
            actions: Vec::new(),
            capacity: capacity.max(1),
            file_path: None,
        }
    }

    /// Record a new action. Assigns id and timestamp, prepends it, and trims
    /// the oldest entries beyond capacity. New actions start in `Sending`.
    pub async fn add_action(&mut self, new: NewAction) -> Result<CodeAction> {
        let action = CodeAction {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            source: new.source,
            action_type: new.action_type,
            preview: derive_preview(&new.prompt),
            prompt: new.prompt,
            image_count: new.image_count,
            status: ActionStatus::Sending,
            request_id: None,
            error: None,
            queue_position: None,
            completed_at: None,
        };

        self.actions.insert(0, action.clone());
        // Capacity bound: evict from the tail (oldest), never the head
        self.actions.truncate(self.capacity);
        self.save().await?;
        Ok(action)
    }

    /// Merge-patch one action. Returns false (and changes nothing) for an
    /// unknown id, an invalid status transition, or a `completed_at` stamp
    /// on a non-terminal status.
    pub async fn update_action(&mut self, id: &str, update: ActionUpdate) -> Result<bool> {
        let Some(action) = self.actions.iter_mut().find(|a| a.id == id) else {
            debug!("update_action: unknown id {}", id);
            return Ok(false);
        };

        let effective_status = update.status.unwrap_or(action.status);
        if let Some(next) = update.status {
            if !action.status.can_transition_to(next) {
                warn!(
                    "Rejecting invalid status transition {} -> {} for action {}",
                    action.status, next, id
                );
                return Ok(false);
            }
        }
        if update.completed_at.is_some() && !effective_status.is_terminal() {
            warn!(
                "Rejecting completed_at stamp on non-terminal status {} for action {}",
                effective_status, id
            );
            return Ok(false);
        }

        if let Some(status) = update.status {
            action.status = status;
        }
        if let Some(request_id) = update.request_id {
            action.request_id = Some(request_id);
        }
        if let Some(error) = update.error {
            action.error = Some(error);
        }
        if let Some(position) = update.queue_position {
            action.queue_position = Some(position);
        }
        if let Some(completed_at) = update.completed_at {
            action.completed_at = Some(completed_at);
        }

        self.save().await?;
        Ok(true)
    }

    /// Remove one action by id.
    pub async fn remove_action(&mut self, id: &str) -> Result<bool> {
        let initial_len = self.actions.len();
        self.actions.retain(|a| a.id != id);

        if self.actions.len() != initial_len {
            self.save().await?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Drop everything.
    pub async fn clear_all(&mut self) -> Result<()> {
        self.actions.clear();
        self.save().await
    }

    /// Drop delivered and fallback-copied actions, keeping anything still in
    /// flight or failed (so it can be retried). Returns how many were
    /// removed.
    pub async fn clear_completed(&mut self) -> Result<usize> {
        let initial_len = self.actions.len();
        self.actions.retain(|a| !a.status.is_success_or_fallback());
        let removed = initial_len - self.actions.len();
        if removed > 0 {
            self.save().await?;
        }
        Ok(removed)
    }

    pub fn get(&self, id: &str) -> Option<&CodeAction> {
        self.actions.iter().find(|a| a.id == id)
    }

    /// Actions not yet in a terminal state.
    pub fn pending_actions(&self) -> Vec<&CodeAction> {
        self.actions
            .iter()
            .filter(|a| !a.status.is_terminal())
            .collect()
    }

    /// The `limit` most recent actions, newest first.
    pub fn recent_actions(&self, limit: usize) -> &[CodeAction] {
        &self.actions[..self.actions.len().min(limit)]
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    async fn save(&self) -> Result<()> {
        if let Some(file_path) = &self.file_path {
            let content = serde_json::to_string_pretty(self)?;

            let mut file = fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(file_path)
                .await?;

            file.write_all(content.as_bytes()).await?;
            file.flush().await?;
        }
        Ok(())
    }
}
