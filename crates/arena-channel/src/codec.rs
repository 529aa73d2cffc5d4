//! Engine.IO v4 / Socket.IO v5 text framing.
//!
//! Every WebSocket text frame is one Engine.IO packet whose first character
//! is its type. Message packets (`4`) carry a Socket.IO packet laid out as
//! `<type>[<namespace>,][<ack id>][<json>]`.

use std::fmt::{self, Write as _};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{ChannelError, Result};

/// The default Socket.IO namespace.
pub const DEFAULT_NAMESPACE: &str = "/";

/// Socket.IO acknowledgement id correlating a send with its reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AckId(pub u64);

impl fmt::Display for AckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Engine.IO open handshake sent by the server right after the upgrade.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    /// Engine.IO session id.
    pub sid: String,
    /// Transports the server could upgrade to.
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between server pings.
    #[serde(default)]
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong.
    #[serde(default)]
    pub ping_timeout: u64,
    /// Largest payload the server accepts.
    #[serde(default)]
    pub max_payload: u64,
}

/// One Engine.IO packet.
#[derive(Clone, Debug, PartialEq)]
pub enum EnginePacket {
    /// `0` handshake.
    Open(Handshake),
    /// `1` transport close.
    Close,
    /// `2` heartbeat from the server.
    Ping,
    /// `3` heartbeat answer.
    Pong,
    /// `4` Socket.IO payload.
    Message(SocketPacket),
    /// `5` transport upgrade.
    Upgrade,
    /// `6` no-op.
    Noop,
}

/// A Socket.IO packet addressed to a namespace.
#[derive(Clone, Debug, PartialEq)]
pub struct SocketPacket {
    /// Namespace the packet belongs to (`/` unless stated).
    pub namespace: String,
    /// Packet contents.
    pub body: PacketBody,
}

/// Socket.IO packet kinds.
#[derive(Clone, Debug, PartialEq)]
pub enum PacketBody {
    /// `0` namespace connect (client request or server acknowledgement).
    Connect(Option<Value>),
    /// `1` namespace disconnect.
    Disconnect,
    /// `2` named event, optionally asking for an acknowledgement.
    Event {
        /// Ack id the sender wants answered.
        ack: Option<AckId>,
        /// Event name.
        name: String,
        /// Event arguments after the name.
        args: Vec<Value>,
    },
    /// `3` acknowledgement of an earlier event.
    Ack {
        /// The id being acknowledged.
        id: AckId,
        /// Reply arguments.
        args: Vec<Value>,
    },
    /// `4` namespace connection refused.
    ConnectError(Value),
}

impl SocketPacket {
    fn on_default(body: PacketBody) -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            body,
        }
    }

    /// CONNECT request for the default namespace.
    pub fn connect() -> Self {
        Self::on_default(PacketBody::Connect(None))
    }

    /// DISCONNECT for the default namespace.
    pub fn disconnect() -> Self {
        Self::on_default(PacketBody::Disconnect)
    }

    /// EVENT on the default namespace.
    pub fn event(name: &str, args: Vec<Value>, ack: Option<AckId>) -> Self {
        Self::on_default(PacketBody::Event {
            ack,
            name: name.to_string(),
            args,
        })
    }

    /// ACK on the default namespace.
    pub fn ack(id: AckId, args: Vec<Value>) -> Self {
        Self::on_default(PacketBody::Ack { id, args })
    }

    /// Encode to the Socket.IO text layout.
    pub fn encode(&self) -> String {
        let (kind, ack, data) = match &self.body {
            PacketBody::Connect(data) => ('0', None, data.clone()),
            PacketBody::Disconnect => ('1', None, None),
            PacketBody::Event { ack, name, args } => {
                let mut items = Vec::with_capacity(args.len() + 1);
                items.push(Value::String(name.clone()));
                items.extend(args.iter().cloned());
                ('2', *ack, Some(Value::Array(items)))
            }
            PacketBody::Ack { id, args } => ('3', Some(*id), Some(Value::Array(args.clone()))),
            PacketBody::ConnectError(data) => ('4', None, Some(data.clone())),
        };

        let mut out = String::new();
        out.push(kind);
        if self.namespace != DEFAULT_NAMESPACE {
            out.push_str(&self.namespace);
            out.push(',');
        }
        if let Some(id) = ack {
            let _ = write!(out, "{id}");
        }
        if let Some(data) = data {
            out.push_str(&data.to_string());
        }
        out
    }

    /// Decode a Socket.IO packet.
    pub fn decode(text: &str) -> Result<Self> {
        let (kind, mut rest) = split_type(text)?;
        if matches!(kind, '5' | '6') {
            return Err(ChannelError::Malformed(
                "binary packets are not supported".into(),
            ));
        }

        let namespace = if rest.starts_with('/') {
            if let Some(idx) = rest.find(',') {
                let ns = &rest[..idx];
                rest = &rest[idx + 1..];
                ns.to_string()
            } else {
                let ns = rest.to_string();
                rest = "";
                ns
            }
        } else {
            DEFAULT_NAMESPACE.to_string()
        };

        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        let ack = if digits > 0 {
            let id = rest[..digits]
                .parse::<u64>()
                .map_err(|e| ChannelError::Malformed(format!("bad ack id: {e}")))?;
            rest = &rest[digits..];
            Some(AckId(id))
        } else {
            None
        };

        let data = if rest.trim().is_empty() {
            None
        } else {
            Some(
                serde_json::from_str::<Value>(rest)
                    .map_err(|e| ChannelError::Malformed(format!("invalid packet data: {e}")))?,
            )
        };

        let body = match kind {
            '0' => PacketBody::Connect(data),
            '1' => PacketBody::Disconnect,
            '2' => {
                let Some(Value::Array(mut items)) = data else {
                    return Err(ChannelError::Malformed("event data is not an array".into()));
                };
                if items.is_empty() {
                    return Err(ChannelError::Malformed("event without a name".into()));
                }
                let Value::String(name) = items.remove(0) else {
                    return Err(ChannelError::Malformed("event name is not a string".into()));
                };
                PacketBody::Event {
                    ack,
                    name,
                    args: items,
                }
            }
            '3' => {
                let Some(id) = ack else {
                    return Err(ChannelError::Malformed("ack without an id".into()));
                };
                let args = match data {
                    Some(Value::Array(items)) => items,
                    Some(other) => vec![other],
                    None => Vec::new(),
                };
                PacketBody::Ack { id, args }
            }
            '4' => PacketBody::ConnectError(data.unwrap_or(Value::Null)),
            other => {
                return Err(ChannelError::Malformed(format!(
                    "unknown socket packet type '{other}'"
                )));
            }
        };

        Ok(Self { namespace, body })
    }
}

impl EnginePacket {
    /// Encode to an Engine.IO text frame.
    pub fn encode(&self) -> String {
        match self {
            Self::Open(handshake) => {
                format!("0{}", serde_json::to_string(handshake).unwrap_or_default())
            }
            Self::Close => "1".to_string(),
            Self::Ping => "2".to_string(),
            Self::Pong => "3".to_string(),
            Self::Message(packet) => format!("4{}", packet.encode()),
            Self::Upgrade => "5".to_string(),
            Self::Noop => "6".to_string(),
        }
    }

    /// Decode an Engine.IO text frame.
    pub fn decode(text: &str) -> Result<Self> {
        let (kind, rest) = split_type(text)?;
        match kind {
            '0' => serde_json::from_str(rest)
                .map(Self::Open)
                .map_err(|e| ChannelError::Malformed(format!("invalid handshake: {e}"))),
            '1' => Ok(Self::Close),
            // Probe payloads are only used during transport upgrades.
            '2' => Ok(Self::Ping),
            '3' => Ok(Self::Pong),
            '4' => SocketPacket::decode(rest).map(Self::Message),
            '5' => Ok(Self::Upgrade),
            '6' => Ok(Self::Noop),
            other => Err(ChannelError::Malformed(format!(
                "unknown engine packet type '{other}'"
            ))),
        }
    }
}

fn split_type(text: &str) -> Result<(char, &str)> {
    let mut chars = text.chars();
    let kind = chars
        .next()
        .ok_or_else(|| ChannelError::Malformed("empty frame".into()))?;
    Ok((kind, chars.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    // ── Engine.IO ──

    #[test]
    fn decode_open_handshake() {
        let frame = r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;
        let packet = EnginePacket::decode(frame).unwrap();
        assert_matches!(packet, EnginePacket::Open(h) => {
            assert_eq!(h.sid, "abc");
            assert_eq!(h.ping_interval, 25_000);
            assert_eq!(h.max_payload, 1_000_000);
        });
    }

    #[test]
    fn decode_heartbeat() {
        assert_eq!(EnginePacket::decode("2").unwrap(), EnginePacket::Ping);
        assert_eq!(EnginePacket::decode("2probe").unwrap(), EnginePacket::Ping);
        assert_eq!(EnginePacket::Pong.encode(), "3");
    }

    #[test]
    fn decode_empty_frame_is_malformed() {
        assert_matches!(EnginePacket::decode(""), Err(ChannelError::Malformed(_)));
    }

    #[test]
    fn decode_unknown_engine_type() {
        assert_matches!(EnginePacket::decode("9"), Err(ChannelError::Malformed(_)));
    }

    #[test]
    fn decode_multibyte_type_does_not_panic() {
        assert_matches!(EnginePacket::decode("é{}"), Err(ChannelError::Malformed(_)));
    }

    // ── Socket.IO ──

    #[test]
    fn decode_connect_ack_with_sid() {
        let packet = EnginePacket::decode(r#"40{"sid":"xyz"}"#).unwrap();
        let EnginePacket::Message(packet) = packet else {
            panic!("expected a socket packet, got {packet:?}");
        };
        assert_eq!(packet.namespace, "/");
        assert_matches!(packet.body, PacketBody::Connect(Some(data)) => {
            assert_eq!(data["sid"], "xyz");
        });
    }

    #[test]
    fn decode_connect_error() {
        let packet = SocketPacket::decode(r#"4{"message":"Not authorized"}"#).unwrap();
        assert_eq!(
            packet.body,
            PacketBody::ConnectError(json!({"message": "Not authorized"}))
        );
    }

    #[test]
    fn decode_event_without_ack() {
        let packet = SocketPacket::decode(r#"2["ping",{"message":"hi"}]"#).unwrap();
        assert_eq!(
            packet.body,
            PacketBody::Event {
                ack: None,
                name: "ping".into(),
                args: vec![json!({"message": "hi"})],
            }
        );
    }

    #[test]
    fn decode_event_with_ack() {
        let packet = SocketPacket::decode(r#"27["poke"]"#).unwrap();
        assert_matches!(packet.body, PacketBody::Event { ack: Some(AckId(7)), name, args } => {
            assert_eq!(name, "poke");
            assert!(args.is_empty());
        });
    }

    #[test]
    fn decode_ack_with_multi_digit_id() {
        let packet = SocketPacket::decode(r#"3123[{"result":"SUCCESS"}]"#).unwrap();
        assert_eq!(
            packet.body,
            PacketBody::Ack {
                id: AckId(123),
                args: vec![json!({"result": "SUCCESS"})],
            }
        );
    }

    #[test]
    fn decode_ack_without_id_is_malformed() {
        assert_matches!(SocketPacket::decode("3[]"), Err(ChannelError::Malformed(_)));
    }

    #[test]
    fn decode_namespace_is_retained() {
        let packet = SocketPacket::decode(r#"2/admin,5["stats"]"#).unwrap();
        assert_eq!(packet.namespace, "/admin");
        assert_matches!(packet.body, PacketBody::Event { ack: Some(AckId(5)), .. });
    }

    #[test]
    fn decode_namespace_without_data() {
        let packet = SocketPacket::decode("1/admin").unwrap();
        assert_eq!(packet.namespace, "/admin");
        assert_eq!(packet.body, PacketBody::Disconnect);
    }

    #[test]
    fn decode_binary_is_unsupported() {
        let frame = r#"51-["upload",{"_placeholder":true,"num":0}]"#;
        let err = SocketPacket::decode(frame).unwrap_err();
        assert!(err.to_string().contains("binary"));
    }

    #[test]
    fn decode_event_data_must_be_named_array() {
        assert_matches!(SocketPacket::decode(r#"2{"a":1}"#), Err(ChannelError::Malformed(_)));
        assert_matches!(SocketPacket::decode("2[]"), Err(ChannelError::Malformed(_)));
        assert_matches!(SocketPacket::decode("2[1]"), Err(ChannelError::Malformed(_)));
    }

    #[test]
    fn decode_invalid_json_is_malformed() {
        assert_matches!(SocketPacket::decode("2[\"x\""), Err(ChannelError::Malformed(_)));
    }

    #[test]
    fn encode_client_packets() {
        assert_eq!(EnginePacket::Message(SocketPacket::connect()).encode(), "40");
        assert_eq!(EnginePacket::Message(SocketPacket::disconnect()).encode(), "41");
        let emit = SocketPacket::event("subscribe", vec![json!({"match_id": 42})], Some(AckId(3)));
        assert_eq!(
            EnginePacket::Message(emit).encode(),
            r#"423["subscribe",{"match_id":42}]"#
        );
    }

    #[test]
    fn encode_event_without_payload() {
        let emit = SocketPacket::event("get_scores", Vec::new(), Some(AckId(1)));
        assert_eq!(emit.encode(), r#"21["get_scores"]"#);
    }

    #[test]
    fn encode_ack_and_namespace() {
        let mut ack = SocketPacket::ack(AckId(9), Vec::new());
        assert_eq!(ack.encode(), "39[]");
        ack.namespace = "/admin".into();
        assert_eq!(ack.encode(), "3/admin,9[]");
    }
}
