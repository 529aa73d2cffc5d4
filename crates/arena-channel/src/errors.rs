//! Channel error types.

use thiserror::Error;

/// Errors from the duplex channel and its correlated exchanges.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// No live channel; the exchange was not attempted.
    #[error("not connected")]
    NotConnected,

    /// The server refused the connection (upgrade rejected, CONNECT_ERROR,
    /// or the handshake did not finish in time).
    #[error("connection refused: {reason}")]
    ConnectionRefused {
        /// Why the handshake failed.
        reason: String,
    },

    /// No reply arrived within the bounded wait.
    #[error("timed out after {timeout_ms}ms waiting for {event}")]
    Timeout {
        /// The event whose reply never arrived.
        event: String,
        /// How long we waited.
        timeout_ms: u64,
    },

    /// The connection ended while the exchange was pending.
    #[error("channel closed")]
    ChannelClosed,

    /// An inbound frame could not be decoded.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// The server URL could not be turned into a socket URL.
    #[error("invalid server url: {0}")]
    InvalidUrl(String),

    /// WebSocket transport error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON encoding error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for channel operations.
pub type Result<T> = std::result::Result<T, ChannelError>;

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn timeout_display() {
        let err = ChannelError::Timeout {
            event: "get_scores".into(),
            timeout_ms: 30_000,
        };
        assert_eq!(err.to_string(), "timed out after 30000ms waiting for get_scores");
    }

    #[test]
    fn refused_display() {
        let err = ChannelError::ConnectionRefused {
            reason: "HTTP 401".into(),
        };
        assert_eq!(err.to_string(), "connection refused: HTTP 401");
    }

    #[test]
    fn malformed_display() {
        let err = ChannelError::Malformed("unknown engine packet type 'x'".into());
        assert!(err.to_string().starts_with("malformed frame:"));
    }

    #[test]
    fn json_error_from_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: ChannelError = json_err.into();
        assert_matches!(err, ChannelError::Json(_));
    }
}
