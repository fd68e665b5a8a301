//! Transport layer error types.

use std::io;

use thiserror::Error;

use super::frame::FrameError;
use super::state::ConnectionState;

/// Transport layer errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Send attempted before `session.ready`.
    #[error("transport not ready (state: {0})")]
    NotReady(ConnectionState),

    /// A `connect()` call is already in flight.
    #[error("connect already in progress")]
    AlreadyConnecting,

    /// The link did not open in time.
    #[error("connection timed out")]
    ConnectTimeout,

    /// No pong arrived within the heartbeat timeout.
    #[error("heartbeat timed out")]
    HeartbeatTimeout,

    /// The peer closed the link.
    #[error("connection closed by peer (code {code})")]
    ConnectionClosed {
        /// Close code sent by the peer, 1006 when none was given.
        code: u16,
        /// Close reason.
        reason: String,
    },

    /// Reconnection gave up.
    #[error("reconnection attempts exhausted after {attempts} tries")]
    Exhausted {
        /// Attempts made.
        attempts: u32,
    },

    /// Illegal state machine edge.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        /// Current state.
        from: ConnectionState,
        /// Requested state.
        to: ConnectionState,
    },

    /// The connection task is gone.
    #[error("transport shut down")]
    Shutdown,

    /// Malformed binary frame.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Malformed control message.
    #[error("invalid control message: {0}")]
    Json(#[from] serde_json::Error),

    /// Socket error.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// WebSocket protocol error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

impl TransportError {
    /// Whether the connection task should try to reconnect after this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::ConnectTimeout
            | TransportError::HeartbeatTimeout
            | TransportError::Io(_)
            | TransportError::WebSocket(_) => true,
            TransportError::ConnectionClosed { code, .. } => !is_clean_close(*code),
            _ => false,
        }
    }

    /// Whether the error ends the connection.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TransportError::ConnectTimeout
                | TransportError::HeartbeatTimeout
                | TransportError::ConnectionClosed { .. }
                | TransportError::Exhausted { .. }
                | TransportError::Shutdown
                | TransportError::Io(_)
                | TransportError::WebSocket(_)
        )
    }

    /// Protocol errors are logged and the offending message dropped.
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, TransportError::Frame(_) | TransportError::Json(_))
    }
}

/// Normal closure or going away; the peer does not want a reconnect.
pub fn is_clean_close(code: u16) -> bool {
    code == crate::core::CLOSE_NORMAL || code == crate::core::CLOSE_GOING_AWAY
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
