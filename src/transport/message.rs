//! JSON control messages.
//!
//! The transport interprets a handful of message types itself (handshake,
//! heartbeat and datagram close). Everything else is forwarded to the
//! application untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::core::PROTOCOL_VERSION;

/// Message type names understood by the transport.
pub mod types {
    /// Sent right after the link opens.
    pub const SESSION_INIT: &str = "session.init";
    /// Server acknowledged `session.init`.
    pub const SESSION_INIT_ACK: &str = "session.init.ack";
    /// Server is ready for audio.
    pub const SESSION_READY: &str = "session.ready";
    /// Datagram-link close notification.
    pub const SESSION_CLOSE: &str = "session.close";
    /// Heartbeat request.
    pub const PING: &str = "ping";
    /// Heartbeat response.
    pub const PONG: &str = "pong";
}

/// The handshake message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInit {
    /// Protocol version.
    pub protocol_version: String,
    /// Optional features the client supports.
    pub features: Vec<String>,
    /// Session identifier.
    pub session_id: String,
    /// User identifier.
    pub user_id: String,
    /// Conversation to resume, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl SessionInit {
    /// Handshake for the current protocol version.
    pub fn new(session_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            features: Vec::new(),
            session_id: session_id.into(),
            user_id: user_id.into(),
            conversation_id: None,
        }
    }

    /// JSON form, including the `type` tag.
    pub fn to_value(&self) -> Value {
        let mut value = json!({ "type": types::SESSION_INIT });
        if let (Value::Object(map), Ok(Value::Object(fields))) =
            (&mut value, serde_json::to_value(self))
        {
            map.extend(fields);
        }
        value
    }
}

/// A control message the transport acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    /// `session.init.ack`.
    InitAck,
    /// `session.ready`.
    Ready,
    /// `ping` from the peer.
    Ping {
        /// Peer timestamp to echo.
        timestamp: u64,
    },
    /// `pong` answering one of our pings.
    Pong {
        /// Our ping timestamp, echoed.
        timestamp: u64,
    },
    /// `session.close`.
    Close {
        /// Close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

impl ControlMessage {
    /// Recognise a transport-level message. Returns `None` for application
    /// messages.
    pub fn parse(value: &Value) -> Option<Self> {
        let kind = value.get("type")?.as_str()?;
        let timestamp = || value.get("timestamp").and_then(Value::as_u64).unwrap_or(0);

        match kind {
            types::SESSION_INIT_ACK => Some(Self::InitAck),
            types::SESSION_READY => Some(Self::Ready),
            types::PING => Some(Self::Ping {
                timestamp: timestamp(),
            }),
            types::PONG => Some(Self::Pong {
                timestamp: timestamp(),
            }),
            types::SESSION_CLOSE => Some(Self::Close {
                code: value
                    .get("code")
                    .and_then(Value::as_u64)
                    .and_then(|c| u16::try_from(c).ok())
                    .unwrap_or(crate::core::CLOSE_NORMAL),
                reason: value
                    .get("reason")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            }),
            _ => None,
        }
    }

    /// JSON form.
    pub fn to_value(&self) -> Value {
        match self {
            Self::InitAck => json!({ "type": types::SESSION_INIT_ACK }),
            Self::Ready => json!({ "type": types::SESSION_READY }),
            Self::Ping { timestamp } => json!({ "type": types::PING, "timestamp": timestamp }),
            Self::Pong { timestamp } => json!({ "type": types::PONG, "timestamp": timestamp }),
            Self::Close { code, reason } => {
                json!({ "type": types::SESSION_CLOSE, "code": code, "reason": reason })
            }
        }
    }
}

/// The `type` field of a message, if present.
pub fn message_type(value: &Value) -> Option<&str> {
    value.get("type").and_then(Value::as_str)
}
