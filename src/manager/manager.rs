//! Active transport ownership and fallback.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::config::ManagerConfig;
use crate::core::{EventBus, Subscription};
use crate::transport::{
    ConnectionState, DatagramDialer, DatagramTransport, FrameType, Transport, TransportConfig,
    TransportError, TransportEvent, TransportKind, TransportMetrics, TransportResult,
    WebSocketDialer, WebSocketTransport,
};

/// Builds transports on demand.
pub trait TransportFactory: Send + Sync {
    /// Create a disconnected transport of `kind`.
    fn create(&self, kind: TransportKind) -> TransportResult<Arc<dyn Transport>>;
}

/// Factory for the built-in WebSocket and datagram transports.
///
/// Every transport it builds shares one [`TransportConfig`], so a fallback
/// replays the same `session.init`.
#[derive(Debug, Clone)]
pub struct DefaultTransportFactory {
    manager: ManagerConfig,
    transport: TransportConfig,
}

impl DefaultTransportFactory {
    /// Create a factory.
    pub fn new(manager: ManagerConfig, transport: TransportConfig) -> Self {
        Self { manager, transport }
    }
}

impl TransportFactory for DefaultTransportFactory {
    fn create(&self, kind: TransportKind) -> TransportResult<Arc<dyn Transport>> {
        match kind {
            TransportKind::WebSocket => Ok(Arc::new(WebSocketTransport::new(
                WebSocketDialer::new(self.manager.ws_url.clone()),
                self.transport.clone(),
            ))),
            TransportKind::Datagram => {
                let peer = self.manager.datagram_peer.ok_or_else(|| {
                    TransportError::Io(std::io::Error::new(
                        std::io::ErrorKind::AddrNotAvailable,
                        "no datagram peer configured",
                    ))
                })?;
                Ok(Arc::new(DatagramTransport::new(
                    DatagramDialer::new(peer),
                    self.transport.clone(),
                )))
            }
        }
    }
}

/// The transport currently in use.
struct Active {
    generation: u64,
    kind: TransportKind,
    transport: Arc<dyn Transport>,
    forward: CancellationToken,
}

impl Active {
    async fn stop(self, preserve_state: bool) {
        self.forward.cancel();
        self.transport.disconnect(preserve_state).await;
    }
}

struct Shared {
    config: ManagerConfig,
    factory: Arc<dyn TransportFactory>,
    events: EventBus<TransportEvent>,
    active: Mutex<Option<Active>>,
    /// Serializes connect, disconnect and switches.
    switching: tokio::sync::Mutex<()>,
    /// Directions already switched in the current failure episode.
    switched: Mutex<HashSet<(TransportKind, TransportKind)>>,
    generation: AtomicU64,
}

impl Shared {
    fn current(&self) -> Option<Arc<dyn Transport>> {
        self.active.lock().as_ref().map(|a| Arc::clone(&a.transport))
    }

    /// Build a transport and start forwarding its events. Does not connect
    /// and does not install it as the active transport.
    fn spawn(self: &Arc<Self>, kind: TransportKind) -> TransportResult<Active> {
        let transport = self.factory.create(kind)?;
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let forward = CancellationToken::new();

        let monitor = Monitor {
            shared: Arc::downgrade(self),
            generation,
            events: self.events.clone(),
            subscription: transport.subscribe(),
            cancel: forward.clone(),
            degraded: Degradation::new(&self.config),
            fallback_on_error: self.config.fallback_enabled,
        };
        tokio::spawn(monitor.run());

        Ok(Active {
            generation,
            kind,
            transport,
            forward,
        })
    }

    /// Spawn a transport and install it as the active one. Does not connect.
    fn launch(self: &Arc<Self>, kind: TransportKind) -> TransportResult<Arc<dyn Transport>> {
        let active = self.spawn(kind)?;
        let transport = Arc::clone(&active.transport);
        *self.active.lock() = Some(active);
        Ok(transport)
    }

    /// Record a switch direction. Returns `false` if it was already used in
    /// this episode or the alternate is unavailable.
    fn claim_switch(&self, from: TransportKind, to: TransportKind) -> bool {
        if !self.config.supports(to) {
            return false;
        }
        self.switched.lock().insert((from, to))
    }

    fn announce_switch(&self, from: TransportKind, to: TransportKind, reason: String) {
        info!(%from, %to, %reason, "transport switched");
        self.events
            .publish(TransportEvent::TransportSwitched { from, to, reason });
    }

    /// Replace the transport of `generation` with its alternate.
    ///
    /// The alternate is connected before the current transport is touched;
    /// if it cannot connect, the current transport stays active. Returns
    /// `true` if the switch happened.
    async fn fall_back(self: &Arc<Self>, generation: u64, reason: String) -> bool {
        let _switching = self.switching.lock().await;

        let from = match self.active.lock().as_ref() {
            Some(active) if active.generation == generation => active.kind,
            _ => return false,
        };
        let to = from.alternate();
        if !self.claim_switch(from, to) {
            warn!(%from, %to, %reason, "fallback unavailable");
            return false;
        }

        let candidate = match self.spawn(to) {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!(%from, %to, error = %e, "fallback transport unavailable");
                self.events.publish(TransportEvent::error(&e));
                return false;
            }
        };
        if let Err(e) = candidate.transport.connect().await {
            warn!(%from, %to, error = %e, "fallback transport failed, keeping current");
            candidate.stop(false).await;
            self.events.publish(TransportEvent::error(&e));
            return false;
        }

        let old = self.active.lock().replace(candidate);
        if let Some(old) = old {
            old.stop(false).await;
        }
        self.announce_switch(from, to, reason);
        true
    }
}

/// Counts consecutive low-quality samples.
#[derive(Debug, Clone)]
struct Degradation {
    enabled: bool,
    threshold: u8,
    required: u32,
    count: u32,
}

impl Degradation {
    fn new(config: &ManagerConfig) -> Self {
        Self {
            enabled: config.switches_on_quality(),
            threshold: config.quality_threshold,
            required: config.degradation_samples,
            count: 0,
        }
    }

    /// Returns `true` once the link has been degraded long enough.
    fn observe(&mut self, score: u8) -> bool {
        if !self.enabled {
            return false;
        }
        if score < self.threshold {
            self.count += 1;
        } else {
            self.count = 0;
        }
        self.count >= self.required
    }
}

/// Forwards one transport's events and watches for fallback triggers.
struct Monitor {
    shared: Weak<Shared>,
    generation: u64,
    events: EventBus<TransportEvent>,
    subscription: Subscription<TransportEvent>,
    cancel: CancellationToken,
    degraded: Degradation,
    fallback_on_error: bool,
}

impl Monitor {
    async fn run(mut self) {
        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                event = self.subscription.recv() => match event {
                    Some(event) => event,
                    None => return,
                },
            };

            let trigger = match &event {
                TransportEvent::Quality(quality) if self.degraded.observe(quality.score) => {
                    Some(format!(
                        "quality below {} for {} samples",
                        self.degraded.threshold, self.degraded.required
                    ))
                }
                TransportEvent::Error { message, .. } if self.fallback_on_error => {
                    Some(message.clone())
                }
                _ => None,
            };
            self.events.publish(event);

            if let Some(reason) = trigger {
                let Some(shared) = self.shared.upgrade() else {
                    return;
                };
                if shared.fall_back(self.generation, reason).await {
                    return;
                }
                self.degraded.count = 0;
            }
        }
    }
}

/// Owns exactly one active transport and falls back to the other kind when
/// it fails or degrades.
///
/// Subscribers attach once to the manager's bus and keep receiving events
/// across switches.
pub struct TransportManager {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for TransportManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportManager")
            .field("config", &self.shared.config)
            .field("active", &self.active_kind())
            .finish()
    }
}

impl TransportManager {
    /// Manager using the built-in transports.
    pub fn new(config: ManagerConfig, transport: TransportConfig) -> Self {
        let factory = Arc::new(DefaultTransportFactory::new(config.clone(), transport));
        Self::with_factory(config, factory)
    }

    /// Manager using a custom factory.
    pub fn with_factory(config: ManagerConfig, factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                factory,
                events: EventBus::new(),
                active: Mutex::new(None),
                switching: tokio::sync::Mutex::new(()),
                switched: Mutex::new(HashSet::new()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &ManagerConfig {
        &self.shared.config
    }

    /// Unified event bus.
    pub fn events(&self) -> &EventBus<TransportEvent> {
        &self.shared.events
    }

    /// Subscribe to the unified event stream.
    pub fn subscribe(&self) -> Subscription<TransportEvent> {
        self.shared.events.subscribe()
    }

    /// Kind of the active transport.
    pub fn active_kind(&self) -> Option<TransportKind> {
        self.shared.active.lock().as_ref().map(|a| a.kind)
    }

    /// State of the active transport.
    pub fn state(&self) -> ConnectionState {
        self.shared
            .current()
            .map(|t| t.state())
            .unwrap_or_default()
    }

    /// Metrics of the active transport.
    pub fn metrics(&self) -> TransportMetrics {
        self.shared
            .current()
            .map(|t| t.metrics())
            .unwrap_or_default()
    }

    /// Connect using the preferred transport, falling back once if it fails.
    pub async fn connect(&self) -> TransportResult<()> {
        let shared = &self.shared;
        let _switching = shared.switching.lock().await;

        if let Some(transport) = shared.current()
            && transport.state().is_connected()
        {
            return Ok(());
        }

        shared.switched.lock().clear();
        let stale = shared.active.lock().take();
        if let Some(stale) = stale {
            stale.stop(false).await;
        }

        let from = shared.config.preferred_kind();
        info!(kind = %from, strategy = ?shared.config.strategy, "connecting");
        let error = match shared.launch(from)?.connect().await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        let to = from.alternate();
        if !shared.config.fallback_enabled || !shared.claim_switch(from, to) {
            return Err(error);
        }
        warn!(%from, %to, error = %error, "initial connect failed, falling back");

        let failed = shared.active.lock().take();
        if let Some(failed) = failed {
            failed.stop(false).await;
        }
        shared.launch(to)?.connect().await?;
        shared.announce_switch(from, to, format!("connect failed: {error}"));
        Ok(())
    }

    /// Disconnect the active transport.
    pub async fn disconnect(&self, preserve_state: bool) {
        let shared = &self.shared;
        let _switching = shared.switching.lock().await;

        let active = shared.active.lock().take();
        if let Some(active) = active {
            let from = active.transport.state();
            active.stop(preserve_state).await;
            if from != ConnectionState::Disconnected {
                shared.events.publish(TransportEvent::StateChanged {
                    from,
                    to: ConnectionState::Disconnected,
                });
            }
        }
        shared.switched.lock().clear();
    }

    /// Send a JSON control message on the active transport.
    pub async fn send(&self, message: Value) -> TransportResult<()> {
        self.transport()?.send(message).await
    }

    /// Send a binary frame on the active transport.
    pub async fn send_binary(
        &self,
        payload: Bytes,
        frame_type: FrameType,
        sequence: u32,
    ) -> TransportResult<()> {
        self.transport()?
            .send_binary(payload, frame_type, sequence)
            .await
    }

    fn transport(&self) -> TransportResult<Arc<dyn Transport>> {
        self.shared
            .current()
            .ok_or(TransportError::NotReady(ConnectionState::Disconnected))
    }
}

impl Drop for TransportManager {
    fn drop(&mut self) {
        if let Some(active) = self.shared.active.lock().take() {
            active.forward.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::SelectionStrategy;
    use crate::transport::memory::{MemoryDialer, MemoryFactory, Peer};
    use crate::transport::{ReconnectPolicy, TransportErrorKind};
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Harness {
        manager: TransportManager,
        websocket: MemoryDialer,
        datagram: MemoryDialer,
        ws_peers: mpsc::UnboundedReceiver<Peer>,
        dg_peers: mpsc::UnboundedReceiver<Peer>,
    }

    fn harness(config: ManagerConfig, transport: TransportConfig) -> Harness {
        let (factory, peers) = MemoryFactory::new(transport);
        Harness {
            websocket: factory.websocket.clone(),
            datagram: factory.datagram.clone(),
            manager: TransportManager::with_factory(config, factory),
            ws_peers: peers.websocket,
            dg_peers: peers.datagram,
        }
    }

    fn with_peer(strategy: SelectionStrategy) -> ManagerConfig {
        ManagerConfig::default()
            .with_strategy(strategy)
            .with_datagram_peer("127.0.0.1:7000".parse().unwrap())
    }

    fn transport_config() -> TransportConfig {
        TransportConfig::builder()
            .session_id("s-42")
            .connect_timeout(Duration::from_secs(1))
            .build()
    }

    async fn make_ready(manager: &TransportManager, peer: &mut Peer) {
        assert_eq!(peer.recv_json().await["type"], "session.init");
        peer.send_json(json!({"type": "session.ready"}));
        while manager.state() != ConnectionState::Ready {
            tokio::task::yield_now().await;
        }
    }

    async fn next_switch(
        events: &mut Subscription<TransportEvent>,
    ) -> (TransportKind, TransportKind, String) {
        loop {
            if let TransportEvent::TransportSwitched { from, to, reason } =
                events.recv().await.unwrap()
            {
                return (from, to, reason);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_prefers_datagram_when_peer_configured() {
        let mut h = harness(
            with_peer(SelectionStrategy::PreferDatagram),
            transport_config(),
        );
        h.manager.connect().await.unwrap();
        assert_eq!(h.manager.active_kind(), Some(TransportKind::Datagram));
        assert!(h.dg_peers.try_recv().is_ok());
        assert_eq!(h.websocket.dials(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_without_transport() {
        let h = harness(ManagerConfig::default(), transport_config());
        let err = h.manager.send(json!({"type": "x"})).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::NotReady(ConnectionState::Disconnected)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_failure_falls_back() {
        let mut h = harness(
            with_peer(SelectionStrategy::PreferDatagram),
            transport_config(),
        );
        let mut events = h.manager.subscribe();
        h.datagram.fail_next(1);

        h.manager.connect().await.unwrap();
        assert_eq!(h.manager.active_kind(), Some(TransportKind::WebSocket));

        let (from, to, reason) = next_switch(&mut events).await;
        assert_eq!((from, to), (TransportKind::Datagram, TransportKind::WebSocket));
        assert!(reason.starts_with("connect failed"));

        let mut peer = h.ws_peers.recv().await.unwrap();
        assert_eq!(peer.recv_json().await["session_id"], "s-42");
    }

    #[tokio::test(start_paused = true)]
    async fn test_websocket_only_surfaces_failure() {
        let h = harness(
            with_peer(SelectionStrategy::WebSocketOnly),
            transport_config(),
        );
        h.websocket.fail_next(1);
        let err = h.manager.connect().await.unwrap_err();
        assert!(matches!(err, TransportError::Io(_)));
        assert_eq!(h.datagram.dials(), 0);
        h.manager.disconnect(false).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_sustained_degradation_switches() {
        let mut h = harness(with_peer(SelectionStrategy::Adaptive), transport_config());
        let mut events = h.manager.subscribe();
        h.manager.connect().await.unwrap();
        let mut peer = h.dg_peers.recv().await.unwrap();
        make_ready(&h.manager, &mut peer).await;

        for _ in 0..3 {
            let ping = peer.recv_json().await;
            assert_eq!(ping["type"], "ping");
            tokio::time::advance(Duration::from_millis(600)).await;
            peer.send_json(json!({"type": "pong", "timestamp": ping["timestamp"]}));
        }

        let (from, to, _) = next_switch(&mut events).await;
        assert_eq!((from, to), (TransportKind::Datagram, TransportKind::WebSocket));
        assert_eq!(h.manager.active_kind(), Some(TransportKind::WebSocket));

        let mut ws = h.ws_peers.recv().await.unwrap();
        assert_eq!(ws.recv_json().await["type"], "session.init");
        assert_eq!(
            peer.recv_close().await,
            Some((1000, "client_disconnect".to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_alternate_keeps_degraded_link() {
        let mut h = harness(with_peer(SelectionStrategy::Adaptive), transport_config());
        let mut events = h.manager.subscribe();
        h.manager.connect().await.unwrap();
        let mut peer = h.dg_peers.recv().await.unwrap();
        make_ready(&h.manager, &mut peer).await;
        h.websocket.fail_next(100);

        for _ in 0..3 {
            let ping = peer.recv_json().await;
            tokio::time::advance(Duration::from_millis(600)).await;
            peer.send_json(json!({"type": "pong", "timestamp": ping["timestamp"]}));
        }

        loop {
            match events.recv().await.unwrap() {
                TransportEvent::Error { .. } => break,
                TransportEvent::TransportSwitched { .. } => panic!("switched to a dead link"),
                _ => {}
            }
        }
        assert_eq!(h.websocket.dials(), 1);
        assert_eq!(h.manager.active_kind(), Some(TransportKind::Datagram));
        assert_eq!(h.manager.state(), ConnectionState::Ready);

        // The degraded link keeps its heartbeat instead of being closed.
        assert_eq!(peer.recv_json().await["type"], "ping");
    }

    #[tokio::test(start_paused = true)]
    async fn test_quality_dip_does_not_switch() {
        let mut h = harness(with_peer(SelectionStrategy::Adaptive), transport_config());
        h.manager.connect().await.unwrap();
        let mut peer = h.dg_peers.recv().await.unwrap();
        make_ready(&h.manager, &mut peer).await;

        for rtt in [600, 600, 20, 600] {
            let ping = peer.recv_json().await;
            tokio::time::advance(Duration::from_millis(rtt)).await;
            peer.send_json(json!({"type": "pong", "timestamp": ping["timestamp"]}));
        }
        // Let the last pong be processed before the next ping.
        let _ = peer.recv_json().await;
        assert_eq!(h.manager.active_kind(), Some(TransportKind::Datagram));
        assert_eq!(h.websocket.dials(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_falls_back_once() {
        let policy = ReconnectPolicy {
            base_delay_ms: 10,
            max_delay_ms: 10,
            max_attempts: 1,
        };
        let transport = TransportConfig::builder().reconnect(policy).build();
        let mut h = harness(with_peer(SelectionStrategy::PreferDatagram), transport);
        let mut events = h.manager.subscribe();
        h.manager.connect().await.unwrap();
        let mut peer = h.dg_peers.recv().await.unwrap();
        make_ready(&h.manager, &mut peer).await;

        h.datagram.fail_next(10);
        peer.close(1011, "crash");

        let mut saw_error = false;
        let (from, to, reason) = loop {
            match events.recv().await.unwrap() {
                TransportEvent::Error { kind, .. } => {
                    assert_eq!(kind, TransportErrorKind::Exhausted);
                    saw_error = true;
                }
                TransportEvent::TransportSwitched { from, to, reason } => break (from, to, reason),
                _ => {}
            }
        };
        assert!(saw_error);
        assert_eq!((from, to), (TransportKind::Datagram, TransportKind::WebSocket));
        assert!(reason.contains("exhausted"));

        // The same direction is not retried within the episode.
        assert!(!h.manager.shared.claim_switch(from, to));
        assert!(h.ws_peers.try_recv().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_publishes_final_state() {
        let mut h = harness(ManagerConfig::default(), transport_config());
        h.manager.connect().await.unwrap();
        let mut peer = h.ws_peers.recv().await.unwrap();
        make_ready(&h.manager, &mut peer).await;

        let mut events = h.manager.subscribe();
        h.manager.disconnect(true).await;
        assert_eq!(h.manager.active_kind(), None);
        assert_eq!(h.manager.state(), ConnectionState::Disconnected);
        assert_eq!(
            events.try_recv(),
            Some(TransportEvent::StateChanged {
                from: ConnectionState::Ready,
                to: ConnectionState::Disconnected,
            })
        );
        assert_eq!(
            peer.recv_close().await,
            Some((1000, "preserve_session".to_string()))
        );
    }
}
