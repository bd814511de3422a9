//! Webhook client for the editor extension's local HTTP endpoint.

mod client;
pub mod protocol;

pub use client::WebhookClient;
pub use protocol::{
    error_codes, evaluate_readiness, ChatHealth, HealthStatus, PollOptions, PollOutcome,
    PollStatus, QueueStatus, Readiness, RequestPhase, RequestStatus, SendResult, ServerHealth,
    StatusProbe, WebhookAction, WebhookPayload, WorkspaceHealth, WorkspaceReadiness,
};
