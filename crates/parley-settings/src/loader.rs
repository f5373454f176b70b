//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ParleySettings::default()`]
//! 2. If a settings file exists, deep-merge its values over the defaults
//! 3. Apply `PARLEY_*` environment variable overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::ParleySettings;

/// Default settings file location (`./parley.json`), overridable with `PARLEY_CONFIG`.
pub fn settings_path() -> PathBuf {
    std::env::var("PARLEY_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("parley.json"))
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<ParleySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; a file with invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<ParleySettings> {
    load_settings_with(path, |key| std::env::var(key).ok())
}

/// Load settings from `path`, resolving overrides through `lookup` instead of
/// the process environment.
pub fn load_settings_with<F>(path: &Path, lookup: F) -> Result<ParleySettings>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = serde_json::to_value(ParleySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: ParleySettings = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, lookup);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `PARLEY_*` overrides read through `lookup`.
///
/// Values that fail to parse or fall outside their range are ignored, leaving
/// the file/default value in place.
pub fn apply_overrides<F>(settings: &mut ParleySettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |key: &str| lookup(key).filter(|v| !v.is_empty());

    if let Some(v) = read("PARLEY_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read("PARLEY_PORT").and_then(|v| parsed("PARLEY_PORT", &v, parse_u16)) {
        settings.server.port = v;
    }
    if let Some(v) = read("PARLEY_PONG_WAIT_MS")
        .and_then(|v| parsed("PARLEY_PONG_WAIT_MS", &v, |s| parse_u64_range(s, 10, 3_600_000)))
    {
        settings.server.pong_wait_ms = v;
    }
    if let Some(v) = read("PARLEY_SHUTDOWN_TIMEOUT_SECS").and_then(|v| {
        parsed("PARLEY_SHUTDOWN_TIMEOUT_SECS", &v, |s| parse_u64_range(s, 1, 3_600))
    }) {
        settings.server.shutdown_timeout_secs = v;
    }
    if let Some(v) = read("PARLEY_MAX_MESSAGE_SIZE").and_then(|v| {
        parsed("PARLEY_MAX_MESSAGE_SIZE", &v, |s| parse_usize_range(s, 1, 64 * 1024 * 1024))
    }) {
        settings.server.max_message_size = v;
    }
    if let Some(v) = read("PARLEY_LOG_LEVEL") {
        settings.logging.level = v.to_lowercase();
    }
    if let Some(v) = read("PARLEY_LOG_JSON").and_then(|v| parsed("PARLEY_LOG_JSON", &v, parse_bool)) {
        settings.logging.json = v;
    }
}

fn parsed<T>(key: &str, val: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
    let result = parse(val);
    if result.is_none() {
        debug!(key, value = %val, "invalid env override, ignoring");
    }
    result
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a port number. `0` is allowed (auto-assign).
pub fn parse_u16(val: &str) -> Option<u16> {
    val.trim().parse().ok()
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;
    use std::collections::HashMap;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({
            "server": {"port": 8000, "host": "localhost"}
        });
        let source = serde_json::json!({
            "server": {"port": 9090}
        });
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "localhost");
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 42);
    }

    #[test]
    fn merge_empty_source() {
        let target = serde_json::json!({"a": 1, "b": {"c": 2}});
        let merged = deep_merge(target.clone(), serde_json::json!({}));
        assert_eq!(merged, target);
    }

    // ── load_settings_with ──────────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let path = Path::new("/nonexistent/parley.json");
        let settings = load_settings_with(path, no_env).unwrap();
        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.server.pong_wait_ms, 10_000);
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parley.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 9100, "pongWaitMs": 2000}, "logging": {"json": true}}"#,
        )
        .unwrap();

        let settings = load_settings_with(&path, no_env).unwrap();
        assert_eq!(settings.server.port, 9100);
        assert_eq!(settings.server.pong_wait_ms, 2000);
        assert!(settings.logging.json);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn load_module_levels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parley.json");
        std::fs::write(
            &path,
            r#"{"logging": {"modules": {"parley_server::session": "debug"}}}"#,
        )
        .unwrap();

        let settings = load_settings_with(&path, no_env).unwrap();
        assert_eq!(
            settings.logging.modules.get("parley_server::session").map(String::as_str),
            Some("debug")
        );
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parley.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = load_settings_with(&path, no_env).unwrap_err();
        assert!(matches!(err, SettingsError::Json(_)));
    }

    #[test]
    fn load_rejects_zero_pong_wait() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parley.json");
        std::fs::write(&path, r#"{"server": {"pongWaitMs": 0}}"#).unwrap();

        let err = load_settings_with(&path, no_env).unwrap_err();
        assert!(matches!(err, SettingsError::InvalidValue(_)));
    }

    #[test]
    fn env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parley.json");
        std::fs::write(&path, r#"{"server": {"port": 9100}}"#).unwrap();

        let env = env_of(&[
            ("PARLEY_PORT", "9200"),
            ("PARLEY_HOST", "127.0.0.1"),
            ("PARLEY_LOG_LEVEL", "DEBUG"),
            ("PARLEY_LOG_JSON", "yes"),
        ]);
        let settings = load_settings_with(&path, env).unwrap();
        assert_eq!(settings.server.port, 9200);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.logging.level, "debug");
        assert!(settings.logging.json);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut settings = ParleySettings::default();
        apply_overrides(
            &mut settings,
            env_of(&[
                ("PARLEY_PORT", "not-a-port"),
                ("PARLEY_PONG_WAIT_MS", "1"),
                ("PARLEY_LOG_JSON", "maybe"),
                ("PARLEY_HOST", ""),
            ]),
        );
        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.server.pong_wait_ms, 10_000);
        assert!(!settings.logging.json);
        assert_eq!(settings.server.host, "0.0.0.0");
    }

    #[test]
    fn env_timing_overrides() {
        let mut settings = ParleySettings::default();
        apply_overrides(
            &mut settings,
            env_of(&[
                ("PARLEY_PONG_WAIT_MS", "500"),
                ("PARLEY_SHUTDOWN_TIMEOUT_SECS", "5"),
                ("PARLEY_MAX_MESSAGE_SIZE", "1024"),
            ]),
        );
        assert_eq!(settings.server.pong_wait_ms, 500);
        assert_eq!(settings.server.shutdown_timeout_secs, 5);
        assert_eq!(settings.server.max_message_size, 1024);
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for v in ["true", "TRUE", "1", "yes", "on"] {
            assert_eq!(parse_bool(v), Some(true), "{v}");
        }
        for v in ["false", "0", "no", "Off"] {
            assert_eq!(parse_bool(v), Some(false), "{v}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_u16_accepts_zero_and_rejects_overflow() {
        assert_eq!(parse_u16("0"), Some(0));
        assert_eq!(parse_u16(" 8000 "), Some(8000));
        assert_eq!(parse_u16("70000"), None);
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u64_range("100", 10, 1000), Some(100));
        assert_eq!(parse_u64_range("5", 10, 1000), None);
        assert_eq!(parse_usize_range("2048", 1, 4096), Some(2048));
        assert_eq!(parse_usize_range("abc", 1, 4096), None);
    }
}
