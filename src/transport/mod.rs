//! Transport layer.
//!
//! Keeps one audio/control channel to the voice server alive:
//!
//! - **Frame encoding/decoding**: [`BinaryFrame`] with a 5-byte header
//! - **Control messages**: [`SessionInit`] and [`ControlMessage`]
//! - **Connection state machine**: [`ConnectionState`] with validated edges
//! - **Timing**: [`RttEstimator`] (RFC 6298), [`PingTracker`], [`ReconnectPolicy`]
//! - **Links**: [`WebSocketDialer`] and [`DatagramDialer`] behind [`Dialer`]
//! - **Connection task**: [`SessionTransport`], shared by every link kind
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        Session / TransportManager       │
//! ├─────────────────────────────────────────┤
//! │   SessionTransport (connection task)    │  ← This module
//! │   heartbeat, reconnection, metrics      │
//! ├────────────────────┬────────────────────┤
//! │   WebSocketLink    │    DatagramLink    │
//! ├────────────────────┼────────────────────┤
//! │     TCP / TLS      │        UDP         │
//! └────────────────────┴────────────────────┘
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

use crate::core::{EventBus, Subscription};

mod config;
mod connection;
mod datagram;
mod error;
mod event;
mod frame;
mod link;
mod message;
mod metrics;
mod state;
mod timing;
mod websocket;

#[cfg(test)]
pub(crate) mod memory;

pub use config::*;
pub use connection::SessionTransport;
pub use datagram::*;
pub use error::*;
pub use event::*;
pub use frame::*;
pub use link::*;
pub use message::*;
pub use metrics::{TransportMetrics, TransportQuality};
pub use state::*;
pub use timing::{
    PingTracker, ReconnectPolicy, RttEstimator, constants as timing_constants, quality_score,
};
pub use websocket::*;

/// Transport over a WebSocket.
pub type WebSocketTransport = SessionTransport<WebSocketDialer>;

/// Transport over UDP datagrams.
pub type DatagramTransport = SessionTransport<DatagramDialer>;

/// A managed connection to the voice server.
///
/// Implementations are interchangeable: the manager and the session only use
/// this trait.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Link kind.
    fn kind(&self) -> TransportKind;

    /// Current state.
    fn state(&self) -> ConnectionState;

    /// Metrics snapshot.
    fn metrics(&self) -> TransportMetrics;

    /// Event bus of this transport.
    fn events(&self) -> &EventBus<TransportEvent>;

    /// Subscribe to transport events.
    fn subscribe(&self) -> Subscription<TransportEvent> {
        self.events().subscribe()
    }

    /// Open the link and send `session.init`.
    ///
    /// Returns once the transport is `Connected`. Fails with
    /// [`TransportError::ConnectTimeout`] if the link does not open within
    /// the configured timeout, in which case reconnection continues in the
    /// background.
    async fn connect(&self) -> TransportResult<()>;

    /// Close the link. Never fails.
    ///
    /// With `preserve_state`, the peer is asked to retain session state.
    async fn disconnect(&self, preserve_state: bool);

    /// Send a JSON control message. Requires `Ready`.
    async fn send(&self, message: Value) -> TransportResult<()>;

    /// Send a binary frame. Requires `Ready`.
    async fn send_binary(
        &self,
        payload: Bytes,
        frame_type: FrameType,
        sequence: u32,
    ) -> TransportResult<()>;
}
