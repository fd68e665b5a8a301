//! In-process links for tests.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tokio::sync::mpsc;

use super::config::TransportConfig;
use super::connection::SessionTransport;
use super::error::{TransportError, TransportResult};
use super::event::TransportKind;
use super::link::{Dialer, Link, Wire};
use super::Transport;
use crate::manager::TransportFactory;

#[derive(Debug)]
struct Inner {
    kind: TransportKind,
    peers: mpsc::UnboundedSender<Peer>,
    fail: AtomicU32,
    hang: AtomicU32,
    dials: AtomicU32,
}

/// Dialer whose links end at a [`Peer`] handed to the test.
#[derive(Debug, Clone)]
pub(crate) struct MemoryDialer {
    inner: Arc<Inner>,
}

impl MemoryDialer {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<Peer>) {
        Self::with_kind(TransportKind::WebSocket)
    }

    pub(crate) fn with_kind(kind: TransportKind) -> (Self, mpsc::UnboundedReceiver<Peer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        let dialer = Self {
            inner: Arc::new(Inner {
                kind,
                peers,
                fail: AtomicU32::new(0),
                hang: AtomicU32::new(0),
                dials: AtomicU32::new(0),
            }),
        };
        (dialer, rx)
    }

    /// Refuse the next `n` dials.
    pub(crate) fn fail_next(&self, n: u32) {
        self.inner.fail.store(n, Ordering::SeqCst);
    }

    /// Never complete the next `n` dials.
    pub(crate) fn hang_next(&self, n: u32) {
        self.inner.hang.store(n, Ordering::SeqCst);
    }

    /// Dials attempted so far.
    pub(crate) fn dials(&self) -> u32 {
        self.inner.dials.load(Ordering::SeqCst)
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl Dialer for MemoryDialer {
    type Link = MemoryLink;

    fn kind(&self) -> TransportKind {
        self.inner.kind
    }

    async fn dial(&self) -> TransportResult<MemoryLink> {
        self.inner.dials.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.inner.hang) {
            std::future::pending::<()>().await;
        }
        if take_one(&self.inner.fail) {
            return Err(io::Error::from(io::ErrorKind::ConnectionRefused).into());
        }

        let (to_peer, from_client) = mpsc::unbounded_channel();
        let (to_client, from_peer) = mpsc::unbounded_channel();
        let peer = Peer {
            tx: to_client,
            rx: from_client,
        };
        if self.inner.peers.send(peer).is_err() {
            return Err(io::Error::from(io::ErrorKind::ConnectionRefused).into());
        }
        Ok(MemoryLink {
            tx: to_peer,
            rx: from_peer,
        })
    }
}

/// Client end of an in-process link.
#[derive(Debug)]
pub(crate) struct MemoryLink {
    tx: mpsc::UnboundedSender<Wire>,
    rx: mpsc::UnboundedReceiver<Wire>,
}

#[async_trait]
impl Link for MemoryLink {
    async fn send(&mut self, wire: Wire) -> TransportResult<()> {
        self.tx
            .send(wire)
            .map_err(|_| TransportError::ConnectionClosed {
                code: 1006,
                reason: String::new(),
            })
    }

    async fn recv(&mut self) -> Option<TransportResult<Wire>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self, code: u16, reason: &str) -> TransportResult<()> {
        let _ = self.tx.send(Wire::Close {
            code,
            reason: reason.to_string(),
        });
        Ok(())
    }
}

/// Server end of an in-process link.
#[derive(Debug)]
pub(crate) struct Peer {
    tx: mpsc::UnboundedSender<Wire>,
    rx: mpsc::UnboundedReceiver<Wire>,
}

impl Peer {
    pub(crate) fn send_json(&self, value: Value) {
        self.send_text(&value.to_string());
    }

    pub(crate) fn send_text(&self, text: &str) {
        let _ = self.tx.send(Wire::Text(text.to_string()));
    }

    pub(crate) fn send_binary(&self, bytes: &[u8]) {
        let _ = self.tx.send(Wire::Binary(Bytes::copy_from_slice(bytes)));
    }

    pub(crate) fn close(&self, code: u16, reason: &str) {
        let _ = self.tx.send(Wire::Close {
            code,
            reason: reason.to_string(),
        });
    }

    pub(crate) async fn recv(&mut self) -> Option<Wire> {
        self.rx.recv().await
    }

    pub(crate) async fn recv_json(&mut self) -> Value {
        match self.recv().await {
            Some(Wire::Text(text)) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected text, got {other:?}"),
        }
    }

    pub(crate) async fn recv_binary(&mut self) -> Bytes {
        match self.recv().await {
            Some(Wire::Binary(bytes)) => bytes,
            other => panic!("expected binary, got {other:?}"),
        }
    }

    /// Skip ahead to the close notification.
    pub(crate) async fn recv_close(&mut self) -> Option<(u16, String)> {
        loop {
            match self.recv().await? {
                Wire::Close { code, reason } => return Some((code, reason)),
                _ => continue,
            }
        }
    }
}

/// Builds transports over memory dialers, one per kind.
pub(crate) struct MemoryFactory {
    pub(crate) websocket: MemoryDialer,
    pub(crate) datagram: MemoryDialer,
    config: TransportConfig,
}

/// Peer queues of a [`MemoryFactory`].
pub(crate) struct FactoryPeers {
    pub(crate) websocket: mpsc::UnboundedReceiver<Peer>,
    pub(crate) datagram: mpsc::UnboundedReceiver<Peer>,
}

impl MemoryFactory {
    pub(crate) fn new(config: TransportConfig) -> (Arc<Self>, FactoryPeers) {
        let (websocket, ws_peers) = MemoryDialer::with_kind(TransportKind::WebSocket);
        let (datagram, dg_peers) = MemoryDialer::with_kind(TransportKind::Datagram);
        let factory = Arc::new(Self {
            websocket,
            datagram,
            config,
        });
        let peers = FactoryPeers {
            websocket: ws_peers,
            datagram: dg_peers,
        };
        (factory, peers)
    }
}

impl TransportFactory for MemoryFactory {
    fn create(&self, kind: TransportKind) -> TransportResult<Arc<dyn Transport>> {
        let dialer = match kind {
            TransportKind::WebSocket => self.websocket.clone(),
            TransportKind::Datagram => self.datagram.clone(),
        };
        Ok(Arc::new(SessionTransport::new(dialer, self.config.clone())))
    }
}
