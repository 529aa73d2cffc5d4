//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ConsoleSettings::default()`]
//! 2. If `~/.arena/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Run [`ConsoleSettings::validate`]
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::ConsoleSettings;

/// Resolve the path to the settings file (`~/.arena/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".arena").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<ConsoleSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<ConsoleSettings> {
    let defaults = serde_json::to_value(ConsoleSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: ConsoleSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate();
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

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are ignored with a warning (fall back to file/default).
pub fn apply_env_overrides(settings: &mut ConsoleSettings) {
    if let Some(v) = read_env_string("ARENA_SERVER_URL") {
        settings.server.base_url = v;
    }
    if let Some(v) = read_env_string("ARENA_API_PATH") {
        settings.server.api_path = v;
    }
    if let Some(v) = read_env_u64("ARENA_EXCHANGE_TIMEOUT_MS", 1, 3_600_000) {
        settings.channel.exchange_timeout_ms = v;
    }
    if let Some(v) = read_env_u64("ARENA_CONNECT_TIMEOUT_MS", 1, 600_000) {
        settings.channel.connect_timeout_ms = v;
    }
    if let Some(v) = read_env_string("ARENA_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers ─────────────────────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}
