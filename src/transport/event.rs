//! Transport events.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::TransportError;
use super::frame::BinaryFrame;
use super::metrics::TransportQuality;
use super::state::ConnectionState;

/// Link implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// WebSocket to the voice server.
    WebSocket,
    /// UDP datagrams to a peer endpoint.
    Datagram,
}

impl TransportKind {
    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WebSocket => "websocket",
            Self::Datagram => "datagram",
        }
    }

    /// The other kind.
    pub fn alternate(self) -> Self {
        match self {
            Self::WebSocket => Self::Datagram,
            Self::Datagram => Self::WebSocket,
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of an error event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    /// Reconnection attempts ran out.
    Exhausted,
    /// The link could not be opened.
    ConnectFailed,
    /// A heartbeat went unanswered.
    HeartbeatTimeout,
    /// The link broke.
    ConnectionLost,
}

impl TransportErrorKind {
    /// Category for an error.
    pub fn of(error: &TransportError) -> Self {
        match error {
            TransportError::Exhausted { .. } => Self::Exhausted,
            TransportError::ConnectTimeout => Self::ConnectFailed,
            TransportError::HeartbeatTimeout => Self::HeartbeatTimeout,
            _ => Self::ConnectionLost,
        }
    }
}

/// Everything a transport reports to its subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The connection state changed.
    StateChanged {
        /// Previous state.
        from: ConnectionState,
        /// New state.
        to: ConnectionState,
    },
    /// Application control message.
    Message(Value),
    /// Inbound binary frame.
    Audio(BinaryFrame),
    /// New quality sample after a pong.
    Quality(TransportQuality),
    /// A reconnection attempt is scheduled.
    Reconnecting {
        /// 1-based attempt number.
        attempt: u32,
        /// Wait before the attempt.
        delay: Duration,
    },
    /// Something failed.
    Error {
        /// Category.
        kind: TransportErrorKind,
        /// Description.
        message: String,
    },
    /// The manager replaced the active transport.
    TransportSwitched {
        /// Previous link kind.
        from: TransportKind,
        /// New link kind.
        to: TransportKind,
        /// Why the switch happened.
        reason: String,
    },
}

impl TransportEvent {
    /// Error event from a transport error.
    pub fn error(error: &TransportError) -> Self {
        Self::Error {
            kind: TransportErrorKind::of(error),
            message: error.to_string(),
        }
    }
}
