//! Config file loading.
//!
//! Deskhook reads an optional `config.toml` from its home directory and
//! merges it over built-in defaults. The home directory is `$DESKHOOK_HOME`
//! when set, otherwise `~/.deskhook`.

use crate::{DeskhookConfig, DeskhookError, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

/// Partial config.toml parsing. Every field is optional; anything absent
/// keeps its built-in default.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigToml {
    /// Webhook endpoint of the editor extension
    pub webhook_url: Option<String>,

    /// WebSocket endpoint of the terminal stream
    pub terminal_ws_url: Option<String>,

    /// Timeout for prompt/action submissions, in seconds
    pub request_timeout_secs: Option<u64>,

    /// Timeout for health/queue/status probes, in seconds
    pub probe_timeout_secs: Option<u64>,

    /// Inactivity window after which a "busy" chat is treated as stuck
    pub stuck_threshold_secs: Option<u64>,

    /// Maximum number of actions kept in the history store
    pub history_capacity: Option<usize>,

    /// Maximum buffered output lines per terminal
    pub max_lines_per_terminal: Option<usize>,

    /// Whether the terminal stream reconnects after abnormal closure
    pub auto_reconnect: Option<bool>,
}

/// Resolve the deskhook home directory.
pub fn deskhook_home() -> Result<PathBuf> {
    if let Ok(home) = std::env::var("DESKHOOK_HOME") {
        return Ok(PathBuf::from(home));
    }

    let home = dirs::home_dir()
        .ok_or_else(|| DeskhookError::Config("Could not find home directory".to_string()))?;
    Ok(home.join(".deskhook"))
}

/// Load the runtime config: defaults, overridden by `{home}/config.toml`
/// where present. A missing file is fine; a malformed one is an error so a
/// typo never silently reverts the user to defaults.
pub async fn load(home: PathBuf) -> Result<DeskhookConfig> {
    let mut config = DeskhookConfig::new(home);
    let config_file = config.config_file();

    if !config_file.exists() {
        debug!("No config file at {:?}, using defaults", config_file);
        return Ok(config);
    }

    let content = tokio::fs::read_to_string(&config_file).await?;
    let parsed: ConfigToml = toml::from_str(&content)
        .map_err(|e| DeskhookError::Config(format!("{}: {}", config_file.display(), e)))?;

    apply(&mut config, parsed);
    Ok(config)
}

fn apply(config: &mut DeskhookConfig, parsed: ConfigToml) {
    if let Some(url) = parsed.webhook_url {
        config.webhook_url = url;
    }
    if let Some(url) = parsed.terminal_ws_url {
        config.terminal_ws_url = url;
    }
    if let Some(secs) = parsed.request_timeout_secs {
        config.request_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = parsed.probe_timeout_secs {
        config.probe_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = parsed.stuck_threshold_secs {
        config.stuck_threshold = Duration::from_secs(secs);
    }
    if let Some(capacity) = parsed.history_capacity {
        if capacity == 0 {
            warn!("history_capacity = 0 is invalid, keeping default");
        } else {
            config.history_capacity = capacity;
        }
    }
    if let Some(max_lines) = parsed.max_lines_per_terminal {
        if max_lines == 0 {
            warn!("max_lines_per_terminal = 0 is invalid, keeping default");
        } else {
            config.max_lines_per_terminal = max_lines;
        }
    }
    if let Some(auto) = parsed.auto_reconnect {
        config.auto_reconnect = auto;
    }
}
