//! UDP datagram link to a peer endpoint.
//!
//! One datagram carries one unit. A datagram starting with `{` is a JSON
//! control message; anything else is a binary frame. Close is signalled with
//! a `session.close` control message since UDP has no close of its own.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use super::error::TransportResult;
use super::event::TransportKind;
use super::link::{Dialer, Link, Wire};
use super::message::ControlMessage;

/// Default receive buffer size.
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 65535;

/// Opens datagram links to a fixed peer.
#[derive(Debug, Clone)]
pub struct DatagramDialer {
    peer: SocketAddr,
    bind: SocketAddr,
    recv_buffer_size: usize,
}

impl DatagramDialer {
    /// Dialer for `peer`, bound to an ephemeral local port.
    pub fn new(peer: SocketAddr) -> Self {
        let bind = if peer.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((std::net::Ipv6Addr::UNSPECIFIED, 0))
        };
        Self {
            peer,
            bind,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
        }
    }

    /// Set the local bind address.
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind = addr;
        self
    }

    /// Set the receive buffer size.
    pub fn recv_buffer_size(mut self, size: usize) -> Self {
        self.recv_buffer_size = size;
        self
    }

    /// Peer endpoint.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

#[async_trait]
impl Dialer for DatagramDialer {
    type Link = DatagramLink;

    fn kind(&self) -> TransportKind {
        TransportKind::Datagram
    }

    async fn dial(&self) -> TransportResult<DatagramLink> {
        let socket = UdpSocket::bind(self.bind).await?;
        socket.connect(self.peer).await?;
        debug!(peer = %self.peer, local = %socket.local_addr()?, "datagram link opened");
        Ok(DatagramLink {
            socket,
            recv_buffer: vec![0u8; self.recv_buffer_size],
        })
    }
}

/// A connected UDP socket.
#[derive(Debug)]
pub struct DatagramLink {
    socket: UdpSocket,
    recv_buffer: Vec<u8>,
}

impl DatagramLink {
    /// Local address of the socket.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    fn decode(datagram: &[u8]) -> Option<Wire> {
        if datagram.first() != Some(&b'{') {
            return Some(Wire::Binary(Bytes::copy_from_slice(datagram)));
        }

        let Ok(text) = std::str::from_utf8(datagram) else {
            warn!(len = datagram.len(), "dropping non-utf8 control datagram");
            return None;
        };

        if let Ok(value) = serde_json::from_str::<serde_json::Value>(text)
            && let Some(ControlMessage::Close { code, reason }) = ControlMessage::parse(&value)
        {
            return Some(Wire::Close { code, reason });
        }
        Some(Wire::Text(text.to_string()))
    }
}

#[async_trait]
impl Link for DatagramLink {
    async fn send(&mut self, wire: Wire) -> TransportResult<()> {
        match wire {
            Wire::Text(text) => self.socket.send(text.as_bytes()).await?,
            Wire::Binary(bytes) => self.socket.send(&bytes).await?,
            Wire::Close { code, reason } => {
                let close = ControlMessage::Close { code, reason }.to_value().to_string();
                self.socket.send(close.as_bytes()).await?
            }
        };
        Ok(())
    }

    async fn recv(&mut self) -> Option<TransportResult<Wire>> {
        loop {
            let len = match self.socket.recv(&mut self.recv_buffer).await {
                Ok(len) => len,
                Err(e) => return Some(Err(e.into())),
            };
            if len == 0 {
                continue;
            }
            if let Some(wire) = Self::decode(&self.recv_buffer[..len]) {
                return Some(Ok(wire));
            }
        }
    }

    async fn close(&mut self, code: u16, reason: &str) -> TransportResult<()> {
        self.send(Wire::Close {
            code,
            reason: reason.to_string(),
        })
        .await
    }
}
