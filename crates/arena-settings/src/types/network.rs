//! Server endpoint, duplex channel, and logging settings.

use serde::{Deserialize, Serialize};

/// Game server HTTP endpoint settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Base URL of the game server.
    pub base_url: String,
    /// Path prefix of the REST API.
    pub api_path: String,
    /// Base URL for the duplex channel when it is served elsewhere.
    /// Falls back to `base_url`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket_url: Option<String>,
}

impl ServerSettings {
    /// Base URL the duplex channel connects to.
    pub fn channel_url(&self) -> &str {
        self.socket_url.as_deref().unwrap_or(&self.base_url)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            api_path: "/api".to_string(),
            socket_url: None,
        }
    }
}

/// Duplex channel settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelSettings {
    /// How long a correlated exchange waits for its reply.
    pub exchange_timeout_ms: u64,
    /// Upper bound for the WebSocket upgrade plus namespace handshake.
    pub connect_timeout_ms: u64,
    /// Capacity of the outbound frame queue.
    pub outbound_capacity: usize,
    /// How long a graceful disconnect waits for the connection to wind down.
    pub disconnect_grace_ms: u64,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            exchange_timeout_ms: 30_000,
            connect_timeout_ms: 10_000,
            outbound_capacity: 64,
            disconnect_grace_ms: 2_000,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level for stderr output (`RUST_LOG` takes precedence).
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}
