use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("unknown log level: {0}")]
    InvalidLevel(String),
    #[error("failed to install tracing subscriber: {0}")]
    Install(String),
}

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "parley_server::session" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// Emit one JSON object per line instead of human-readable output.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Build a config from textual levels, as they appear in settings files.
    pub fn from_levels<'a, I>(level: &str, modules: I, json: bool) -> Result<Self, TelemetryError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let log_level = parse_level(level)?;
        let module_levels = modules
            .into_iter()
            .map(|(module, lvl)| parse_level(lvl).map(|l| (module.to_string(), l)))
            .collect::<Result<Vec<_>, TelemetryError>>()?;
        Ok(Self {
            log_level,
            module_levels,
            json,
        })
    }

    /// The filter directive used when RUST_LOG is not set, e.g. `info,parley_server=debug`.
    pub fn filter_directive(&self) -> String {
        let mut filter_str = self.log_level.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            filter_str.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
        }
        filter_str
    }
}

fn parse_level(level: &str) -> Result<Level, TelemetryError> {
    Level::from_str(level).map_err(|_| TelemetryError::InvalidLevel(level.to_string()))
}

/// Initialize the global tracing subscriber. Call once at startup.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directive()));

    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(true).boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(env_filter))
        .try_init()
        .map_err(|e| TelemetryError::Install(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_directive_is_info() {
        assert_eq!(TelemetryConfig::default().filter_directive(), "info");
    }

    #[test]
    fn module_levels_appended() {
        let config = TelemetryConfig {
            log_level: Level::WARN,
            module_levels: vec![
                ("parley_server".into(), Level::DEBUG),
                ("tower_http".into(), Level::TRACE),
            ],
            json: false,
        };
        assert_eq!(
            config.filter_directive(),
            "warn,parley_server=debug,tower_http=trace"
        );
    }

    #[test]
    fn from_levels_parses_text() {
        let config =
            TelemetryConfig::from_levels("debug", [("parley_server::hub", "trace")], true).unwrap();
        assert_eq!(config.log_level, Level::DEBUG);
        assert_eq!(config.module_levels[0].1, Level::TRACE);
        assert!(config.json);
    }

    #[test]
    fn from_levels_rejects_unknown_level() {
        let err = TelemetryConfig::from_levels("verbose", [], false).unwrap_err();
        assert!(matches!(err, TelemetryError::InvalidLevel(ref l) if l == "verbose"));
    }

    #[test]
    fn second_init_reports_error() {
        let config = TelemetryConfig::default();
        let _ = init_telemetry(&config);
        assert!(init_telemetry(&config).is_err());
    }
}
