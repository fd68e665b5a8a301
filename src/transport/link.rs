//! Link abstraction shared by the WebSocket and datagram implementations.
//!
//! A [`Dialer`] opens a [`Link`]; the connection task owns the link and drives
//! it. Links only move [`Wire`] units; framing of control messages and audio
//! happens above them.

use async_trait::async_trait;
use bytes::Bytes;

use super::error::TransportResult;
use super::event::TransportKind;

/// One unit on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Wire {
    /// JSON control message.
    Text(String),
    /// Encoded binary frame.
    Binary(Bytes),
    /// Close notification.
    Close {
        /// Close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

impl Wire {
    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        match self {
            Wire::Text(text) => text.len(),
            Wire::Binary(bytes) => bytes.len(),
            Wire::Close { reason, .. } => reason.len() + 2,
        }
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An open bidirectional link.
///
/// `recv` must be cancel safe: the connection task polls it inside
/// `tokio::select!`.
#[async_trait]
pub trait Link: Send + 'static {
    /// Write one unit.
    async fn send(&mut self, wire: Wire) -> TransportResult<()>;

    /// Read the next unit. `None` means the link ended without a close.
    async fn recv(&mut self) -> Option<TransportResult<Wire>>;

    /// Send a close notification and release the link.
    async fn close(&mut self, code: u16, reason: &str) -> TransportResult<()>;
}

/// Opens links of one kind.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    /// Link type produced.
    type Link: Link;

    /// Kind reported in events.
    fn kind(&self) -> TransportKind;

    /// Open a new link.
    async fn dial(&self) -> TransportResult<Self::Link>;
}
