//! Settings type definitions.
//!
//! Field names are camelCase on disk. Every struct is `#[serde(default)]`,
//! so a partial JSON file only overrides the keys it names.

use std::collections::BTreeMap;
use std::time::Duration;

use parley_core::Liveness;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Root settings for the parley server.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParleySettings {
    /// Listener and connection timing.
    pub server: ServerSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl ParleySettings {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.server.pong_wait_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "server.pongWaitMs must be greater than zero".into(),
            ));
        }
        if self.server.max_message_size == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxMessageSize must be greater than zero".into(),
            ));
        }
        check_level("logging.level", &self.logging.level)?;
        for (module, level) in &self.logging.modules {
            check_level(&format!("logging.modules.{module}"), level)?;
        }
        Ok(())
    }
}

fn check_level(key: &str, level: &str) -> Result<()> {
    if LOG_LEVELS.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        Err(SettingsError::InvalidValue(format!(
            "{key}: unknown log level {level:?}"
        )))
    }
}

/// Network listener and per-connection timing.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port (`0` picks a free port).
    pub port: u16,
    /// Liveness window in milliseconds; pings go out at 9/10 of it.
    pub pong_wait_ms: u64,
    /// How long shutdown waits for connections to drain.
    pub shutdown_timeout_secs: u64,
    /// Largest inbound frame accepted, in bytes.
    pub max_message_size: usize,
}

impl ServerSettings {
    pub fn liveness(&self) -> Liveness {
        Liveness::from_millis(self.pong_wait_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            pong_wait_ms: 10_000,
            shutdown_timeout_secs: 60,
            max_message_size: 64 * 1024,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level. `RUST_LOG` takes precedence when set.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Per-module level overrides, e.g. `{"parley_server": "debug"}`.
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            modules: BTreeMap::new(),
        }
    }
}
