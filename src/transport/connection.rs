//! The connection task and its handle.
//!
//! [`SessionTransport`] owns one background task per connection episode. The
//! task owns the link and is the only place that reads, writes, pings or
//! reconnects. Callers reach it through an ordered command queue and read
//! state and metrics from shared snapshots.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Transport;
use super::config::TransportConfig;
use super::error::{TransportError, TransportResult, is_clean_close};
use super::event::{TransportEvent, TransportKind};
use super::frame::{BinaryFrame, FrameType};
use super::link::{Dialer, Link, Wire};
use super::message::ControlMessage;
use super::metrics::{MetricsRecorder, TransportMetrics};
use super::state::{ConnectionState, ConnectionStateMachine};
use super::timing::PingTracker;
use crate::core::{CLOSE_NORMAL, CLOSE_REASON_CLIENT, CLOSE_REASON_PRESERVE, EventBus};

/// Time allowed for the task to close the link after a disconnect.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Close code used when a link ends without a close frame.
const CLOSE_ABNORMAL: u16 = 1006;

/// State shared between the handle and the task.
#[derive(Debug)]
struct Shared {
    machine: Mutex<ConnectionStateMachine>,
    metrics: Mutex<MetricsRecorder>,
    events: EventBus<TransportEvent>,
    /// Set while a disconnect tears the task down; suppresses events.
    detached: AtomicBool,
    preserve_session: AtomicBool,
    kind: TransportKind,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        self.machine.lock().state()
    }

    fn publish(&self, event: TransportEvent) {
        if !self.detached.load(Ordering::Acquire) {
            self.events.publish(event);
        }
    }

    fn set_state(&self, to: ConnectionState) -> TransportResult<()> {
        let from = {
            let mut machine = self.machine.lock();
            if machine.state() == to {
                return Ok(());
            }
            machine.transition(to)?
        };
        debug!(transport = %self.kind, %from, %to, "state changed");
        self.publish(TransportEvent::StateChanged { from, to });
        Ok(())
    }

    /// Transition from inside the task, where an illegal edge means a
    /// disconnect already moved the machine on.
    fn advance(&self, to: ConnectionState) {
        if let Err(e) = self.set_state(to) {
            debug!(transport = %self.kind, error = %e, "ignoring stale transition");
        }
    }
}

struct TaskHandle {
    outbound: mpsc::UnboundedSender<Wire>,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

/// Resets the connect guard when `connect()` returns.
struct ConnectGuard<'a>(&'a AtomicBool);

impl Drop for ConnectGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A transport over any [`Dialer`].
///
/// Lifecycle, heartbeat, reconnection and metrics behave identically whatever
/// the link.
pub struct SessionTransport<D: Dialer> {
    dialer: Arc<D>,
    config: TransportConfig,
    shared: Arc<Shared>,
    connecting: AtomicBool,
    task: Mutex<Option<TaskHandle>>,
}

impl<D: Dialer> std::fmt::Debug for SessionTransport<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTransport")
            .field("kind", &self.shared.kind)
            .field("state", &self.shared.state())
            .finish()
    }
}

impl<D: Dialer> SessionTransport<D> {
    /// Create a disconnected transport.
    pub fn new(dialer: D, config: TransportConfig) -> Self {
        let kind = dialer.kind();
        Self {
            dialer: Arc::new(dialer),
            config,
            shared: Arc::new(Shared {
                machine: Mutex::new(ConnectionStateMachine::new()),
                metrics: Mutex::new(MetricsRecorder::default()),
                events: EventBus::new(),
                detached: AtomicBool::new(false),
                preserve_session: AtomicBool::new(false),
                kind,
            }),
            connecting: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// The dialer.
    pub fn dialer(&self) -> &D {
        &self.dialer
    }

    /// Stop the task, closing the link if one is open.
    async fn stop_task(&self, preserve_state: bool) {
        let handle = self.task.lock().take();
        let Some(handle) = handle else {
            return;
        };

        self.shared.detached.store(true, Ordering::Release);
        self.shared
            .preserve_session
            .store(preserve_state, Ordering::Release);
        handle.cancel.cancel();
        drop(handle.outbound);

        let mut join = handle.join;
        if tokio::time::timeout(CLOSE_GRACE, &mut join).await.is_err() {
            warn!(transport = %self.shared.kind, "connection task did not stop in time");
            join.abort();
        }
        self.shared.detached.store(false, Ordering::Release);
    }

    fn enqueue(&self, wire: Wire) -> TransportResult<()> {
        let state = self.shared.state();
        if state != ConnectionState::Ready {
            return Err(TransportError::NotReady(state));
        }
        let task = self.task.lock();
        let Some(handle) = task.as_ref() else {
            return Err(TransportError::NotReady(state));
        };
        handle
            .outbound
            .send(wire)
            .map_err(|_| TransportError::Shutdown)
    }
}

impl<D: Dialer> Drop for SessionTransport<D> {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.cancel.cancel();
        }
    }
}

#[async_trait]
impl<D: Dialer> Transport for SessionTransport<D> {
    fn kind(&self) -> TransportKind {
        self.shared.kind
    }

    fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    fn metrics(&self) -> TransportMetrics {
        self.shared.metrics.lock().snapshot()
    }

    fn events(&self) -> &EventBus<TransportEvent> {
        &self.shared.events
    }

    async fn connect(&self) -> TransportResult<()> {
        if self.connecting.swap(true, Ordering::AcqRel) {
            return Err(TransportError::AlreadyConnecting);
        }
        let _guard = ConnectGuard(&self.connecting);

        if self.shared.state().is_connected() {
            return Ok(());
        }

        // A previous episode may still be reconnecting.
        self.stop_task(false).await;
        self.shared.advance(ConnectionState::Disconnected);

        self.shared.metrics.lock().reset();
        self.shared.set_state(ConnectionState::Connecting)?;
        info!(transport = %self.shared.kind, session_id = %self.config.session_id, "connecting");

        let (opened_tx, opened_rx) = oneshot::channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let driver = Driver {
            dialer: Arc::clone(&self.dialer),
            config: self.config.clone(),
            shared: Arc::clone(&self.shared),
            cancel: cancel.clone(),
            outbound: outbound_rx,
            ping: PingTracker::new(),
            heartbeat: None,
        };
        let join = tokio::spawn(driver.run(opened_tx));

        *self.task.lock() = Some(TaskHandle {
            outbound: outbound_tx,
            cancel,
            join,
        });

        opened_rx.await.unwrap_or(Err(TransportError::Shutdown))
    }

    async fn disconnect(&self, preserve_state: bool) {
        info!(transport = %self.shared.kind, preserve_state, "disconnecting");
        self.stop_task(preserve_state).await;
        self.shared.advance(ConnectionState::Disconnected);
    }

    async fn send(&self, message: Value) -> TransportResult<()> {
        self.enqueue(Wire::Text(message.to_string()))
    }

    async fn send_binary(
        &self,
        payload: Bytes,
        frame_type: FrameType,
        sequence: u32,
    ) -> TransportResult<()> {
        let frame = BinaryFrame::new(frame_type, sequence, payload);
        self.enqueue(Wire::Binary(frame.encode()))
    }
}

/// Why the drive loop stopped.
enum Outcome {
    Cancelled,
    PeerClosed { code: u16, reason: String },
    Failed(TransportError),
}

/// What an inbound message asks the loop to do.
enum Flow {
    Continue,
    Closed { code: u16, reason: String },
}

/// The connection task.
struct Driver<D: Dialer> {
    dialer: Arc<D>,
    config: TransportConfig,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    outbound: mpsc::UnboundedReceiver<Wire>,
    ping: PingTracker,
    heartbeat: Option<Interval>,
}

impl<D: Dialer> Driver<D> {
    fn kind(&self) -> TransportKind {
        self.shared.kind
    }

    async fn run(mut self, opened: oneshot::Sender<TransportResult<()>>) {
        let cancel = self.cancel.clone();
        let first = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            result = self.open() => result,
        };

        let mut link = match first {
            Ok(link) => {
                let _ = opened.send(Ok(()));
                link
            }
            Err(e) => {
                warn!(transport = %self.kind(), error = %e, "initial connect failed");
                let retry = e.is_retryable() && self.config.auto_reconnect;
                let _ = opened.send(Err(e));
                if !retry {
                    self.shared.advance(ConnectionState::Error);
                    return;
                }
                match self.reconnect(None).await {
                    Some(link) => link,
                    None => return,
                }
            }
        };

        loop {
            let cause = match self.drive(&mut link).await {
                Outcome::Cancelled => {
                    self.close(&mut link).await;
                    return;
                }
                Outcome::PeerClosed { code, reason } if is_clean_close(code) => {
                    info!(transport = %self.kind(), code, %reason, "peer closed session");
                    self.shared.advance(ConnectionState::Closed);
                    return;
                }
                Outcome::PeerClosed { code, reason } => {
                    warn!(transport = %self.kind(), code, %reason, "connection closed unexpectedly");
                    TransportError::ConnectionClosed { code, reason }
                }
                Outcome::Failed(e) => {
                    warn!(transport = %self.kind(), error = %e, "connection failed");
                    e
                }
            };
            drop(link);

            match self.reconnect(Some(cause)).await {
                Some(next) => link = next,
                None => return,
            }
        }
    }

    /// Dial with the connect timeout, send `session.init` and enter `Connected`.
    async fn open(&mut self) -> TransportResult<D::Link> {
        let mut link = tokio::time::timeout(self.config.connect_timeout(), self.dialer.dial())
            .await
            .map_err(|_| TransportError::ConnectTimeout)??;

        let init = self.config.session_init().to_value().to_string();
        self.write(&mut link, Wire::Text(init)).await?;

        self.ping.clear();
        self.heartbeat = None;
        self.shared.metrics.lock().on_open();
        self.shared.advance(ConnectionState::Connected);
        Ok(link)
    }

    /// Back off and redial until a link opens or attempts run out.
    ///
    /// `cause` is what broke the previous link; it is reported as-is when
    /// automatic reconnection is off.
    async fn reconnect(&mut self, cause: Option<TransportError>) -> Option<D::Link> {
        self.ping.clear();
        self.heartbeat = None;

        if !self.config.auto_reconnect {
            if let Some(cause) = cause {
                self.fail(cause);
            }
            return None;
        }

        let policy = self.config.reconnect;
        let cancel = self.cancel.clone();
        let mut attempt = 0;
        loop {
            attempt += 1;
            if !policy.allows(attempt) {
                self.fail(TransportError::Exhausted {
                    attempts: attempt - 1,
                });
                return None;
            }

            let delay = policy.delay(attempt);
            self.shared.advance(ConnectionState::Reconnecting);
            self.shared.metrics.lock().on_reconnect_attempt(attempt);
            info!(
                transport = %self.kind(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                "reconnecting"
            );
            self.shared
                .publish(TransportEvent::Reconnecting { attempt, delay });

            let opened = tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                result = async {
                    tokio::time::sleep(delay).await;
                    self.open().await
                } => result,
            };

            match opened {
                Ok(link) => {
                    info!(transport = %self.kind(), attempt, "reconnected");
                    return Some(link);
                }
                Err(e) => {
                    warn!(transport = %self.kind(), attempt, error = %e, "reconnect attempt failed");
                }
            }
        }
    }

    fn fail(&self, error: TransportError) {
        warn!(transport = %self.kind(), error = %error, "giving up");
        self.shared.advance(ConnectionState::Error);
        self.shared.publish(TransportEvent::error(&error));
    }

    async fn close(&mut self, link: &mut D::Link) {
        let reason = if self.shared.preserve_session.load(Ordering::Acquire) {
            CLOSE_REASON_PRESERVE
        } else {
            CLOSE_REASON_CLIENT
        };
        if let Err(e) = link.close(CLOSE_NORMAL, reason).await {
            debug!(transport = %self.kind(), error = %e, "close failed");
        }
    }

    async fn drive(&mut self, link: &mut D::Link) -> Outcome {
        loop {
            let pong_deadline = self
                .ping
                .pending_since()
                .map(|sent| sent + self.config.heartbeat_timeout());

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Outcome::Cancelled,
                Some(wire) = self.outbound.recv() => {
                    if let Err(e) = self.write(link, wire).await {
                        return Outcome::Failed(e);
                    }
                }
                incoming = link.recv() => {
                    let flow = match incoming {
                        Some(Ok(Wire::Text(text))) => self.on_text(link, text).await,
                        Some(Ok(Wire::Binary(bytes))) => {
                            self.on_binary(&bytes);
                            Ok(Flow::Continue)
                        }
                        Some(Ok(Wire::Close { code, reason })) => Ok(Flow::Closed { code, reason }),
                        Some(Err(e)) => Err(e),
                        None => Ok(Flow::Closed {
                            code: CLOSE_ABNORMAL,
                            reason: String::new(),
                        }),
                    };
                    match flow {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Closed { code, reason }) => return Outcome::PeerClosed { code, reason },
                        Err(e) => return Outcome::Failed(e),
                    }
                }
                _ = sleep_until(pong_deadline) => {
                    return Outcome::Failed(TransportError::HeartbeatTimeout);
                }
                _ = tick(&mut self.heartbeat) => {
                    // The outstanding ping keeps its deadline.
                    if self.ping.pending_since().is_some() {
                        continue;
                    }
                    let timestamp = self.ping.on_ping();
                    let ping = ControlMessage::Ping { timestamp }.to_value().to_string();
                    if let Err(e) = self.write(link, Wire::Text(ping)).await {
                        return Outcome::Failed(e);
                    }
                }
            }
        }
    }

    async fn write(&mut self, link: &mut D::Link, wire: Wire) -> TransportResult<()> {
        let len = wire.len();
        link.send(wire).await?;
        self.shared.metrics.lock().on_sent(len);
        Ok(())
    }

    async fn on_text(&mut self, link: &mut D::Link, text: String) -> TransportResult<Flow> {
        self.shared.metrics.lock().on_received(text.len());

        let value: Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(e) => {
                warn!(transport = %self.kind(), error = %e, "dropping unparseable control message");
                return Ok(Flow::Continue);
            }
        };

        match ControlMessage::parse(&value) {
            Some(ControlMessage::InitAck) => {
                debug!(transport = %self.kind(), "session.init acknowledged");
            }
            Some(ControlMessage::Ready) => {
                self.shared.advance(ConnectionState::Ready);
                self.start_heartbeat();
            }
            Some(ControlMessage::Ping { timestamp }) => {
                let pong = ControlMessage::Pong { timestamp }.to_value().to_string();
                self.write(link, Wire::Text(pong)).await?;
            }
            Some(ControlMessage::Pong { timestamp }) => {
                if let Some(rtt) = self.ping.on_pong(timestamp) {
                    let quality = self.shared.metrics.lock().on_rtt(rtt);
                    debug!(
                        transport = %self.kind(),
                        rtt_ms = quality.rtt_ms,
                        score = quality.score,
                        "heartbeat"
                    );
                    self.shared.publish(TransportEvent::Quality(quality));
                }
            }
            Some(ControlMessage::Close { code, reason }) => {
                return Ok(Flow::Closed { code, reason });
            }
            None => self.shared.publish(TransportEvent::Message(value)),
        }
        Ok(Flow::Continue)
    }

    fn on_binary(&mut self, bytes: &[u8]) {
        self.shared.metrics.lock().on_received(bytes.len());
        match BinaryFrame::decode(bytes) {
            Ok(frame) => self.shared.publish(TransportEvent::Audio(frame)),
            Err(e) => {
                warn!(
                    transport = %self.kind(),
                    frame_type = bytes.first().copied().unwrap_or_default(),
                    error = %e,
                    "dropping binary frame"
                );
            }
        }
    }

    fn start_heartbeat(&mut self) {
        if self.heartbeat.is_some() {
            return;
        }
        let period = self.config.heartbeat_interval();
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.heartbeat = Some(interval);
    }
}

async fn tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::{MemoryDialer, Peer};
    use crate::transport::timing::ReconnectPolicy;
    use serde_json::json;

    fn config() -> TransportConfig {
        TransportConfig::builder()
            .session_id("s-1")
            .user_id("u-1")
            .connect_timeout(Duration::from_secs(1))
            .build()
    }

    async fn ready(transport: &SessionTransport<MemoryDialer>, peer: &mut Peer) {
        let init = peer.recv_json().await;
        assert_eq!(init["type"], "session.init");
        peer.send_json(json!({"type": "session.ready"}));
        while transport.state() != ConnectionState::Ready {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_sends_session_init() {
        let (dialer, mut peers) = MemoryDialer::new();
        let transport = SessionTransport::new(dialer, config());

        transport.connect().await.unwrap();
        assert_eq!(transport.state(), ConnectionState::Connected);

        let mut peer = peers.recv().await.unwrap();
        let init = peer.recv_json().await;
        assert_eq!(init["session_id"], "s-1");
        assert_eq!(init["user_id"], "u-1");
        assert_eq!(init["protocol_version"], crate::core::PROTOCOL_VERSION);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_requires_ready() {
        let (dialer, mut peers) = MemoryDialer::new();
        let transport = SessionTransport::new(dialer, config());

        let err = transport.send(json!({"type": "x"})).await.unwrap_err();
        assert!(matches!(err, TransportError::NotReady(ConnectionState::Disconnected)));

        transport.connect().await.unwrap();
        let err = transport
            .send_binary(Bytes::from_static(b"pcm"), FrameType::AudioIn, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NotReady(ConnectionState::Connected)));

        let mut peer = peers.recv().await.unwrap();
        ready(&transport, &mut peer).await;
        transport.send(json!({"type": "hello"})).await.unwrap();
        transport
            .send_binary(Bytes::from_static(b"pcm"), FrameType::AudioIn, 7)
            .await
            .unwrap();

        assert_eq!(peer.recv_json().await["type"], "hello");
        let frame = BinaryFrame::decode(&peer.recv_binary().await).unwrap();
        assert_eq!(frame.sequence, 7);
        assert_eq!(&frame.payload[..], b"pcm");
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_connect_is_rejected() {
        let (dialer, _peers) = MemoryDialer::new();
        dialer.hang_next(1);
        let transport = Arc::new(SessionTransport::new(dialer, config()));

        let first = {
            let transport = Arc::clone(&transport);
            tokio::spawn(async move { transport.connect().await })
        };
        tokio::task::yield_now().await;
        assert!(matches!(
            transport.connect().await,
            Err(TransportError::AlreadyConnecting)
        ));

        let result = first.await.unwrap();
        assert!(matches!(result, Err(TransportError::ConnectTimeout)));
        assert_eq!(transport.state(), ConnectionState::Reconnecting);
        transport.disconnect(false).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbound_routing() {
        let (dialer, mut peers) = MemoryDialer::new();
        let transport = SessionTransport::new(dialer, config());
        let mut events = transport.subscribe();
        transport.connect().await.unwrap();
        let mut peer = peers.recv().await.unwrap();
        ready(&transport, &mut peer).await;

        peer.send_json(json!({"type": "transcript", "text": "hi"}));
        peer.send_text("not json");
        peer.send_binary(&[0x09, 0, 0, 0, 1]);
        peer.send_binary(&BinaryFrame::new(FrameType::AudioOut, 3, vec![1, 2]).encode());
        peer.send_json(json!({"type": "ping", "timestamp": 99}));

        let mut message = None;
        let mut audio = None;
        while message.is_none() || audio.is_none() {
            match events.recv().await.unwrap() {
                TransportEvent::Message(value) => message = Some(value),
                TransportEvent::Audio(frame) => audio = Some(frame),
                _ => {}
            }
        }
        assert_eq!(message.unwrap()["text"], "hi");
        assert_eq!(audio.unwrap().sequence, 3);
        assert_eq!(peer.recv_json().await, json!({"type": "pong", "timestamp": 99}));
        assert_eq!(transport.state(), ConnectionState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_measures_quality() {
        let (dialer, mut peers) = MemoryDialer::new();
        let transport = SessionTransport::new(dialer, config());
        let mut events = transport.subscribe();
        transport.connect().await.unwrap();
        let mut peer = peers.recv().await.unwrap();
        ready(&transport, &mut peer).await;

        tokio::time::advance(Duration::from_secs(15)).await;
        let ping = peer.recv_json().await;
        assert_eq!(ping["type"], "ping");

        tokio::time::advance(Duration::from_millis(120)).await;
        peer.send_json(json!({"type": "pong", "timestamp": ping["timestamp"]}));

        loop {
            if let TransportEvent::Quality(quality) = events.recv().await.unwrap() {
                assert_eq!(quality.score, 70);
                break;
            }
        }
        assert_eq!(transport.metrics().quality.score, 70);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_timeout_reconnects() {
        let (dialer, mut peers) = MemoryDialer::new();
        let transport = SessionTransport::new(dialer, config());
        let mut events = transport.subscribe();
        transport.connect().await.unwrap();
        let mut peer = peers.recv().await.unwrap();
        ready(&transport, &mut peer).await;

        // Ping goes unanswered.
        tokio::time::advance(Duration::from_secs(15)).await;
        assert_eq!(peer.recv_json().await["type"], "ping");
        tokio::time::advance(Duration::from_secs(5)).await;

        loop {
            if let TransportEvent::Reconnecting { attempt, delay } = events.recv().await.unwrap() {
                assert_eq!(attempt, 1);
                assert_eq!(delay, Duration::from_secs(1));
                break;
            }
        }

        let mut second = peers.recv().await.unwrap();
        assert_eq!(second.recv_json().await["type"], "session.init");
        assert_eq!(transport.state(), ConnectionState::Connected);
        assert_eq!(transport.metrics().reconnect_attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_ping_is_not_replaced() {
        let config = TransportConfig::builder()
            .session_id("s-1")
            .connect_timeout(Duration::from_secs(1))
            .heartbeat(Duration::from_secs(5), Duration::from_secs(5))
            .build();
        let (dialer, mut peers) = MemoryDialer::new();
        let transport = SessionTransport::new(dialer, config);
        let mut events = transport.subscribe();
        transport.connect().await.unwrap();
        let mut peer = peers.recv().await.unwrap();
        ready(&transport, &mut peer).await;

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(peer.recv_json().await["type"], "ping");

        // The next tick lands on the pong deadline.
        tokio::time::advance(Duration::from_secs(5)).await;
        loop {
            if let TransportEvent::Reconnecting { attempt, .. } = events.recv().await.unwrap() {
                assert_eq!(attempt, 1);
                break;
            }
        }
        assert_ne!(transport.state(), ConnectionState::Ready);
        assert!(peer.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_close_does_not_reconnect() {
        let (dialer, mut peers) = MemoryDialer::new();
        let transport = SessionTransport::new(dialer, config());
        transport.connect().await.unwrap();
        let mut peer = peers.recv().await.unwrap();
        ready(&transport, &mut peer).await;

        peer.close(1000, "done");
        while transport.state() != ConnectionState::Closed {
            tokio::task::yield_now().await;
        }
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(peers.try_recv().is_err());
        assert_eq!(transport.state(), ConnectionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_enters_error() {
        let (dialer, mut peers) = MemoryDialer::new();
        let policy = ReconnectPolicy {
            base_delay_ms: 100,
            max_delay_ms: 1000,
            max_attempts: 2,
        };
        let transport = SessionTransport::new(
            dialer.clone(),
            TransportConfig::builder().reconnect(policy).build(),
        );
        let mut events = transport.subscribe();
        transport.connect().await.unwrap();
        let mut peer = peers.recv().await.unwrap();
        ready(&transport, &mut peer).await;

        dialer.fail_next(10);
        peer.close(1006, "");

        let mut delays = Vec::new();
        loop {
            match events.recv().await.unwrap() {
                TransportEvent::Reconnecting { delay, .. } => delays.push(delay),
                TransportEvent::Error { kind, .. } => {
                    assert_eq!(kind, crate::transport::TransportErrorKind::Exhausted);
                    break;
                }
                _ => {}
            }
        }
        assert_eq!(delays, vec![Duration::from_millis(100), Duration::from_millis(200)]);
        assert_eq!(transport.state(), ConnectionState::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_during_backoff_stops_attempts() {
        let (dialer, mut peers) = MemoryDialer::new();
        let transport = SessionTransport::new(dialer, config());
        let mut events = transport.subscribe();
        transport.connect().await.unwrap();
        let mut peer = peers.recv().await.unwrap();
        ready(&transport, &mut peer).await;

        peer.close(1011, "server error");
        loop {
            if let TransportEvent::Reconnecting { .. } = events.recv().await.unwrap() {
                break;
            }
        }

        transport.disconnect(false).await;
        assert_eq!(transport.state(), ConnectionState::Disconnected);

        tokio::time::advance(Duration::from_secs(120)).await;
        tokio::task::yield_now().await;
        assert!(peers.try_recv().is_err());
        assert_eq!(transport.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_closes_with_reason() {
        let (dialer, mut peers) = MemoryDialer::new();
        let transport = SessionTransport::new(dialer, config());
        transport.connect().await.unwrap();
        let mut peer = peers.recv().await.unwrap();
        ready(&transport, &mut peer).await;

        let mut events = transport.subscribe();
        transport.disconnect(true).await;
        assert_eq!(
            peer.recv_close().await,
            Some((1000, "preserve_session".to_string()))
        );

        // Only the final state change is delivered.
        match events.try_recv() {
            Some(TransportEvent::StateChanged { to, .. }) => {
                assert_eq!(to, ConnectionState::Disconnected)
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(events.try_recv().is_none());
    }
}
