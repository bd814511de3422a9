//! Prompt dispatch - the submission flow behind `deskhook send`.
//!
//! One submission runs strictly sequentially: record the action, check
//! readiness (waiting out a busy chat within a bounded budget), deliver,
//! update the tracker from the response. Any outcome that cannot reach the
//! extension falls back to copying the composed prompt to the clipboard so
//! the user's input is never lost.

use crate::clipboard::copy_to_clipboard;
use crate::tracker::{ActionSource, ActionStatus, ActionStore, ActionUpdate, CodeAction, NewAction};
use crate::webhook::{PollOptions, PollOutcome, PollStatus, RequestStatus, SendResult, WebhookClient};
use crate::Result;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// A prompt ready to submit.
#[derive(Debug, Clone)]
pub struct PromptSubmission {
    pub prompt: String,
    pub context: Option<String>,
    pub source: ActionSource,
    pub action_type: String,
    pub image_count: Option<u32>,
}

impl PromptSubmission {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            context: None,
            source: ActionSource::Manual,
            action_type: "prompt".to_string(),
            image_count: None,
        }
    }

    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context;
        self
    }

    pub fn with_source(mut self, source: ActionSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_action_type(mut self, action_type: impl Into<String>) -> Self {
        self.action_type = action_type.into();
        self
    }

    /// The full text recorded in the tracker and used for the clipboard
    /// fallback.
    pub fn composed_text(&self) -> String {
        match &self.context {
            Some(context) if !context.trim().is_empty() => {
                format!("{}\n\n---\nContext:\n{}", self.prompt, context)
            }
            _ => self.prompt.clone(),
        }
    }
}

/// How a submission ended.
#[derive(Debug)]
pub enum DeliveryOutcome {
    /// The extension accepted the prompt (possibly queued behind other work)
    Delivered {
        action: CodeAction,
        result: SendResult,
    },
    /// Delivery was impossible; the composed prompt is on the clipboard
    CopiedToClipboard {
        action: CodeAction,
        reason: String,
        suggestions: Vec<String>,
    },
    /// Delivery failed AND the clipboard was unavailable
    Lost {
        action: CodeAction,
        reason: String,
        clipboard_error: String,
    },
}

impl DeliveryOutcome {
    pub fn action(&self) -> &CodeAction {
        match self {
            Self::Delivered { action, .. }
            | Self::CopiedToClipboard { action, .. }
            | Self::Lost { action, .. } => action,
        }
    }
}

/// Ties the webhook client, the action tracker and the clipboard fallback
/// together. Collaborators are injected so tests can substitute fakes.
pub struct Dispatcher {
    client: WebhookClient,
    store: Arc<RwLock<ActionStore>>,
}

impl Dispatcher {
    pub fn new(client: WebhookClient, store: Arc<RwLock<ActionStore>>) -> Self {
        Self { client, store }
    }

    pub fn client(&self) -> &WebhookClient {
        &self.client
    }

    pub fn store(&self) -> Arc<RwLock<ActionStore>> {
        self.store.clone()
    }

    /// Run the full submission flow for a new prompt.
    pub async fn send(&self, submission: PromptSubmission) -> Result<DeliveryOutcome> {
        let composed = submission.composed_text();
        let action = {
            let mut store = self.store.write().await;
            store
                .add_action(NewAction {
                    source: submission.source,
                    action_type: submission.action_type.clone(),
                    prompt: composed.clone(),
                    image_count: submission.image_count,
                })
                .await?
        };

        self.deliver(
            action.id.clone(),
            &submission.prompt,
            submission.context.as_deref(),
            &composed,
        )
        .await
    }

    /// Re-send a failed or fallback-copied action. Returns `None` for an
    /// unknown id.
    pub async fn retry(&self, action_id: &str) -> Result<Option<DeliveryOutcome>> {
        let existing = {
            let store = self.store.read().await;
            store.get(action_id).cloned()
        };
        let Some(existing) = existing else {
            return Ok(None);
        };

        let moved = {
            let mut store = self.store.write().await;
            store
                .update_action(action_id, ActionUpdate::status(ActionStatus::Sending))
                .await?
        };
        if !moved {
            warn!("Cannot retry action {} from status {}", action_id, existing.status);
            return Ok(None);
        }

        // The stored prompt is already the composed text
        let outcome = self
            .deliver(action_id.to_string(), &existing.prompt, None, &existing.prompt)
            .await?;
        Ok(Some(outcome))
    }

    async fn deliver(
        &self,
        action_id: String,
        prompt: &str,
        context: Option<&str>,
        composed: &str,
    ) -> Result<DeliveryOutcome> {
        // Readiness gate. Only a busy chat can clear on its own, so only
        // that case is worth waiting out.
        let summary = self.client.check_workspace_ready().await;
        if !summary.connected {
            return self
                .fallback(&action_id, composed, "Extension is not reachable", None, Vec::new())
                .await;
        }
        if !summary.workspace_ready {
            return self
                .fallback(
                    &action_id,
                    composed,
                    "No workspace is open in the editor",
                    None,
                    Vec::new(),
                )
                .await;
        }
        if summary.chat_busy {
            let readiness = self.client.is_ready().await;
            if !readiness.ready {
                info!("Assistant chat is busy; waiting for it to free up");
                if !self.client.wait_until_chat_free().await {
                    return self
                        .fallback(
                            &action_id,
                            composed,
                            "Assistant chat stayed busy",
                            None,
                            Vec::new(),
                        )
                        .await;
                }
            }
        }

        let result = self.client.send_prompt(prompt, context).await;

        if result.success {
            let status = if result.is_queued() {
                ActionStatus::Queued
            } else {
                ActionStatus::SentToVscode
            };
            let update = ActionUpdate {
                status: Some(status),
                request_id: result.request_id.clone(),
                queue_position: result.queue_position,
                completed_at: (status == ActionStatus::SentToVscode).then(Utc::now),
                ..Default::default()
            };
            let mut store = self.store.write().await;
            store.update_action(&action_id, update).await?;
            let action = store.get(&action_id).cloned().expect("action just updated");
            return Ok(DeliveryOutcome::Delivered { action, result });
        }

        let reason = result
            .message
            .clone()
            .or_else(|| result.error.clone())
            .unwrap_or_else(|| "Delivery failed".to_string());
        self.fallback(
            &action_id,
            composed,
            &reason,
            result.error.clone(),
            result.suggestions,
        )
        .await
    }

    /// Copy the composed prompt to the clipboard and settle the action. The
    /// action's error field keeps the structured code when one exists.
    async fn fallback(
        &self,
        action_id: &str,
        composed: &str,
        reason: &str,
        error_code: Option<String>,
        suggestions: Vec<String>,
    ) -> Result<DeliveryOutcome> {
        info!("Falling back to clipboard: {}", reason);
        let recorded_error = error_code.unwrap_or_else(|| reason.to_string());

        match copy_to_clipboard(composed) {
            Ok(()) => {
                let mut store = self.store.write().await;
                store
                    .update_action(
                        action_id,
                        ActionUpdate {
                            status: Some(ActionStatus::CopiedFallback),
                            error: Some(recorded_error),
                            completed_at: Some(Utc::now()),
                            ..Default::default()
                        },
                    )
                    .await?;
                let action = store.get(action_id).cloned().expect("action exists");
                Ok(DeliveryOutcome::CopiedToClipboard {
                    action,
                    reason: reason.to_string(),
                    suggestions,
                })
            }
            Err(e) => {
                warn!("Clipboard fallback failed: {}", e);
                let mut store = self.store.write().await;
                store
                    .update_action(action_id, ActionUpdate::failed(reason.to_string()))
                    .await?;
                let action = store.get(action_id).cloned().expect("action exists");
                Ok(DeliveryOutcome::Lost {
                    action,
                    reason: reason.to_string(),
                    clipboard_error: e.to_string(),
                })
            }
        }
    }

    /// Poll a delivered action's request to completion, mirroring each
    /// observed transition into the tracker. Returns `None` when the action
    /// is unknown or carries no request id.
    pub async fn follow<F>(
        &self,
        action_id: &str,
        options: PollOptions,
        mut on_status: F,
    ) -> Result<Option<PollOutcome>>
    where
        F: FnMut(RequestStatus),
    {
        let request_id = {
            let store = self.store.read().await;
            store.get(action_id).and_then(|a| a.request_id.clone())
        };
        let Some(request_id) = request_id else {
            return Ok(None);
        };

        let mut last_observed: Option<RequestStatus> = None;
        let outcome = self
            .client
            .poll_for_completion(&request_id, options, |status| {
                last_observed = Some(status);
                on_status(status);
            })
            .await;

        let update = match outcome.status {
            PollStatus::Completed => Some(ActionUpdate {
                status: Some(ActionStatus::SentToVscode),
                completed_at: Some(Utc::now()),
                ..Default::default()
            }),
            PollStatus::Failed => Some(ActionUpdate::failed(
                outcome
                    .error
                    .clone()
                    .unwrap_or_else(|| "Request failed".to_string()),
            )),
            PollStatus::NotFound => Some(ActionUpdate::failed(
                outcome
                    .error
                    .clone()
                    .unwrap_or_else(|| "Request not found".to_string()),
            )),
            PollStatus::Timeout => match last_observed {
                Some(RequestStatus::Processing) => {
                    Some(ActionUpdate::status(ActionStatus::Processing))
                }
                _ => None,
            },
        };

        if let Some(update) = update {
            let mut store = self.store.write().await;
            store.update_action(action_id, update).await?;
        }

        Ok(Some(outcome))
    }
}
