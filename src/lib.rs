//! Deskhook - developer console companion
//!
//! A CLI companion for a local editor-assistant extension that:
//! - Relays prompts and console context over the extension's HTTP webhook
//! - Keeps a persisted history of every outgoing request
//! - Streams terminal output from the extension over WebSocket
//!
//! When delivery is impossible, the composed prompt is copied to the system
//! clipboard so nothing is lost.

pub mod clipboard;
pub mod config;
pub mod dispatch;
pub mod terminal;
pub mod tracker;
pub mod tui;
pub mod webhook;

pub use dispatch::{DeliveryOutcome, Dispatcher};
pub use tracker::{ActionSource, ActionStatus, ActionStore, CodeAction};
pub use webhook::WebhookClient;

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for Deskhook
#[derive(Debug, Clone)]
pub struct DeskhookConfig {
    /// Deskhook home directory (config file, action history)
    pub home: PathBuf,

    /// Webhook endpoint of the editor extension
    pub webhook_url: String,

    /// WebSocket endpoint of the terminal stream
    pub terminal_ws_url: String,

    /// Timeout for prompt/action submissions
    pub request_timeout: Duration,

    /// Timeout for health/queue/status probes
    pub probe_timeout: Duration,

    /// Inactivity window after which a "busy" chat is treated as stuck
    pub stuck_threshold: Duration,

    /// Maximum number of actions kept in the history store
    pub history_capacity: usize,

    /// Maximum buffered output lines per terminal
    pub max_lines_per_terminal: usize,

    /// Whether the terminal stream reconnects after abnormal closure
    pub auto_reconnect: bool,
}

impl DeskhookConfig {
    pub const DEFAULT_WEBHOOK_URL: &'static str = "http://localhost:9090/webhook";
    pub const DEFAULT_TERMINAL_WS_URL: &'static str = "ws://localhost:9091";

    pub fn new(home: PathBuf) -> Self {
        Self {
            home,
            webhook_url: Self::DEFAULT_WEBHOOK_URL.to_string(),
            terminal_ws_url: Self::DEFAULT_TERMINAL_WS_URL.to_string(),
            request_timeout: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(3),
            stuck_threshold: Duration::from_secs(60),
            history_capacity: 50,
            max_lines_per_terminal: 1000,
            auto_reconnect: true,
        }
    }

    pub fn with_webhook_url(mut self, url: impl Into<String>) -> Self {
        self.webhook_url = url.into();
        self
    }

    pub fn with_terminal_ws_url(mut self, url: impl Into<String>) -> Self {
        self.terminal_ws_url = url.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_stuck_threshold(mut self, threshold: Duration) -> Self {
        self.stuck_threshold = threshold;
        self
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Path of the persisted action history blob.
    pub fn history_file(&self) -> PathBuf {
        self.home.join(format!("{}.json", tracker::STORAGE_KEY))
    }

    /// Path of the config file.
    pub fn config_file(&self) -> PathBuf {
        self.home.join("config.toml")
    }
}

/// Result type for Deskhook operations
pub type Result<T> = std::result::Result<T, DeskhookError>;

/// Errors that can occur in Deskhook
#[derive(Debug, thiserror::Error)]
pub enum DeskhookError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Clipboard error: {0}")]
    Clipboard(String),

    #[error("Terminal stream error: {0}")]
    Stream(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
