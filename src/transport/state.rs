//! Connection state machine.
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──open──▶ Connected ──session.ready──▶ Ready
//!                                                   ▲
//!        any but Disconnected ──▶ Reconnecting ─────┘
//!        any but Disconnected ──▶ Error | Closed
//!        any ──disconnect──▶ Disconnected
//! ```

use serde::{Deserialize, Serialize};

use super::error::{TransportError, TransportResult};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No link and no attempt in progress.
    #[default]
    Disconnected,
    /// Opening the link.
    Connecting,
    /// Link open, handshake sent.
    Connected,
    /// Server confirmed the session; audio may flow.
    Ready,
    /// Waiting to retry after a failure.
    Reconnecting,
    /// Reconnection gave up.
    Error,
    /// The peer closed the session normally.
    Closed,
}

impl ConnectionState {
    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Ready => "ready",
            Self::Reconnecting => "reconnecting",
            Self::Error => "error",
            Self::Closed => "closed",
        }
    }

    /// Link is open (handshake sent or session ready).
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected | Self::Ready)
    }

    /// No further automatic activity will happen.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected | Self::Error | Self::Closed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validates state changes.
#[derive(Debug, Clone, Default)]
pub struct ConnectionStateMachine {
    state: ConnectionState,
}

impl ConnectionStateMachine {
    /// Machine in `Disconnected`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether `from -> to` is a legal edge.
    pub fn is_allowed(from: ConnectionState, to: ConnectionState) -> bool {
        use ConnectionState::*;
        match (from, to) {
            (_, Disconnected) => true,
            (Disconnected | Error | Closed, Connecting) => true,
            (Connecting | Reconnecting, Connected) => true,
            (Connected, Ready) => true,
            (Disconnected, _) => false,
            (_, Reconnecting | Error | Closed) => from != to,
            _ => false,
        }
    }

    /// Move to `to`, or fail with [`TransportError::InvalidTransition`].
    pub fn transition(&mut self, to: ConnectionState) -> TransportResult<ConnectionState> {
        let from = self.state;
        if !Self::is_allowed(from, to) {
            return Err(TransportError::InvalidTransition { from, to });
        }
        self.state = to;
        Ok(from)
    }
}
