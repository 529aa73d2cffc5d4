//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` for the JSON file
//! format and `#[serde(default)]` so partial JSON is accepted: missing
//! fields take their [`Default`] value during deserialization.

mod network;
mod play;

pub use network::*;
pub use play::*;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root settings type for the arena console.
///
/// Loaded from `~/.arena/settings.json` with defaults applied for missing
/// fields. Environment variables can override specific values.
///
/// # JSON Format
///
/// ```json
/// {
///   "server": { "baseUrl": "http://game.local:8080" },
///   "channel": { "exchangeTimeoutMs": 5000 },
///   "accounts": { "momo": "1234" }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConsoleSettings {
    /// Settings schema version.
    pub version: String,
    /// Game server HTTP endpoint settings.
    pub server: ServerSettings,
    /// Duplex channel settings.
    pub channel: ChannelSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
    /// Defaults for `create_match`.
    #[serde(rename = "match")]
    pub new_match: MatchSettings,
    /// Known player passwords, used when `login` is given only a name.
    pub accounts: BTreeMap<String, String>,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        let accounts = [("momo", "1234"), ("jan", "1234")]
            .into_iter()
            .map(|(player, password)| (player.to_string(), password.to_string()))
            .collect();
        Self {
            version: "0.1.0".to_string(),
            server: ServerSettings::default(),
            channel: ChannelSettings::default(),
            logging: LoggingSettings::default(),
            new_match: MatchSettings::default(),
            accounts,
        }
    }
}

impl ConsoleSettings {
    /// Correct out-of-range values in place.
    ///
    /// Called automatically during loading. Invalid values are replaced
    /// with their defaults (or clamped) and a warning is logged, so a bad
    /// file never leaves the console with a zero timeout.
    pub fn validate(&mut self) {
        fn non_zero(val: &mut u64, fallback: u64, name: &str) {
            if *val == 0 {
                tracing::warn!("{name} must be positive, using {fallback}");
                *val = fallback;
            }
        }

        let defaults = ChannelSettings::default();
        let ch = &mut self.channel;
        non_zero(
            &mut ch.exchange_timeout_ms,
            defaults.exchange_timeout_ms,
            "exchangeTimeoutMs",
        );
        non_zero(
            &mut ch.connect_timeout_ms,
            defaults.connect_timeout_ms,
            "connectTimeoutMs",
        );
        if ch.outbound_capacity == 0 {
            tracing::warn!("outboundCapacity must be positive, clamped to 1");
            ch.outbound_capacity = 1;
        }

        if self.new_match.max_players == 0 {
            tracing::warn!("match.maxPlayers must be positive, clamped to 1");
            self.new_match.max_players = 1;
        }

        let trimmed = self.server.base_url.trim_end_matches('/');
        if trimmed.len() != self.server.base_url.len() {
            self.server.base_url = trimmed.to_string();
        }
        if !self.server.api_path.starts_with('/') {
            self.server.api_path.insert(0, '/');
        }
    }

    /// Look up the preset password for a player.
    pub fn password_for(&self, player: &str) -> Option<&str> {
        self.accounts.get(player).map(String::as_str)
    }
}
