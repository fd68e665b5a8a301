//! Voice session orchestrator.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::config::SessionConfig;
use super::error::SessionResult;
use super::event::{SessionEvent, SessionStatistics, SpeechOutcome, SpeechSignal};
use crate::classifier::{BargeInClassifier, ClassificationInput, PhraseTable};
use crate::core::{
    AudioCodec, AudioStreamInfo, BitrateController, DEFAULT_SAMPLE_RATE, EchoEvent,
    EchoFeedbackMonitor, EventBus, Subscription, codec,
};
use crate::duplex::{DuplexState, FullDuplexConfigUpdate, OverlapHandler, OverlapInput};
use crate::manager::{DefaultTransportFactory, TransportFactory, TransportManager};
use crate::transport::{ConnectionState, FrameType, TransportError, TransportEvent, TransportKind};

/// Optional collaborators plugged into a session.
#[derive(Default)]
pub struct Collaborators {
    echo_monitor: Option<Box<dyn EchoFeedbackMonitor>>,
    bitrate_controller: Option<Box<dyn BitrateController>>,
    transport_factory: Option<Arc<dyn TransportFactory>>,
    phrase_table: Option<Arc<PhraseTable>>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("echo_monitor", &self.echo_monitor.is_some())
            .field("bitrate_controller", &self.bitrate_controller.is_some())
            .field("transport_factory", &self.transport_factory.is_some())
            .field("phrase_table", &self.phrase_table.as_ref().map(|t| &t.version))
            .finish()
    }
}

impl Collaborators {
    /// No collaborators; built-in transports and phrase table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an echo feedback monitor.
    pub fn echo_monitor(mut self, monitor: impl EchoFeedbackMonitor + 'static) -> Self {
        self.echo_monitor = Some(Box::new(monitor));
        self
    }

    /// Use a bitrate controller.
    pub fn bitrate_controller(mut self, controller: impl BitrateController + 'static) -> Self {
        self.bitrate_controller = Some(Box::new(controller));
        self
    }

    /// Build transports with a custom factory.
    pub fn transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.transport_factory = Some(factory);
        self
    }

    /// Classify with a custom phrase table.
    pub fn phrase_table(mut self, table: Arc<PhraseTable>) -> Self {
        self.phrase_table = Some(table);
        self
    }
}

/// Speech-path state guarded by one lock.
struct Speech {
    handler: OverlapHandler,
    echo: Option<Box<dyn EchoFeedbackMonitor>>,
    ai_speaking: bool,
    user_speaking: bool,
    /// Whether the AI was playing when the current utterance began.
    ai_at_speech_start: bool,
}

struct Pump {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

type SharedBitrate = Arc<Mutex<Option<Box<dyn BitrateController>>>>;

/// One voice session: transport, classification and overlap handling.
///
/// Every method takes `&self`; share the session behind an `Arc` to drive it
/// from several tasks.
pub struct VoiceSession {
    config: SessionConfig,
    classifier: BargeInClassifier,
    manager: TransportManager,
    events: EventBus<SessionEvent>,
    speech: Mutex<Speech>,
    bitrate: SharedBitrate,
    pump: Mutex<Option<Pump>>,
    sequence: AtomicU32,
    frames_sent: AtomicU64,
}

impl fmt::Debug for VoiceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoiceSession")
            .field("session_id", &self.config.transport.session_id)
            .field("state", &self.state())
            .field("active_transport", &self.active_transport())
            .finish()
    }
}

impl VoiceSession {
    /// Create a disconnected session.
    pub fn new(config: SessionConfig, collaborators: Collaborators) -> SessionResult<Self> {
        config.validate()?;

        let Collaborators {
            echo_monitor,
            bitrate_controller,
            transport_factory,
            phrase_table,
        } = collaborators;

        let events = EventBus::new();
        let table = phrase_table.unwrap_or_else(PhraseTable::builtin);
        let classifier = BargeInClassifier::with_table(config.classifier.clone(), table);

        let factory = transport_factory.unwrap_or_else(|| {
            Arc::new(DefaultTransportFactory::new(
                config.manager.clone(),
                config.transport.clone(),
            ))
        });
        let manager = TransportManager::with_factory(config.manager.clone(), factory);

        let echo = echo_monitor
            .filter(|_| config.echo_monitoring)
            .map(|mut echo| {
                let bus = events.clone();
                echo.on_all(Box::new(move |event: &EchoEvent| {
                    // Metrics arrive through the start callback.
                    if !matches!(event, EchoEvent::Metrics(_)) {
                        bus.publish(SessionEvent::Echo(event.clone()));
                    }
                }));
                echo
            });

        let bitrate = bitrate_controller
            .filter(|_| config.adaptive_bitrate)
            .map(|mut controller| {
                let bus = events.clone();
                controller.on_quality_change(Box::new(move |profile| {
                    bus.publish(SessionEvent::ProfileChanged(profile));
                }));
                controller
            });

        Ok(Self {
            speech: Mutex::new(Speech {
                handler: OverlapHandler::new(config.duplex.clone()),
                echo,
                ai_speaking: false,
                user_speaking: false,
                ai_at_speech_start: false,
            }),
            config,
            classifier,
            manager,
            events,
            bitrate: Arc::new(Mutex::new(bitrate)),
            pump: Mutex::new(None),
            sequence: AtomicU32::new(0),
            frames_sent: AtomicU64::new(0),
        })
    }

    /// Configuration in use.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The classifier.
    pub fn classifier(&self) -> &BargeInClassifier {
        &self.classifier
    }

    /// Session event bus.
    pub fn events(&self) -> &EventBus<SessionEvent> {
        &self.events
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> Subscription<SessionEvent> {
        self.events.subscribe()
    }

    /// Transport state.
    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// Kind of the active transport.
    pub fn active_transport(&self) -> Option<TransportKind> {
        self.manager.active_kind()
    }

    /// Current duplex state.
    pub fn duplex_state(&self) -> DuplexState {
        self.speech.lock().handler.state()
    }

    /// Counters for the session.
    pub fn statistics(&self) -> SessionStatistics {
        SessionStatistics {
            overlap: self.speech.lock().handler.statistics(),
            transport: self.manager.metrics(),
            audio_frames_sent: self.frames_sent.load(Ordering::Relaxed),
            active_transport: self.manager.active_kind(),
        }
    }

    /// Start collaborators and connect the transport.
    pub async fn connect(&self) -> SessionResult<()> {
        if self.start_pump() {
            if let Some(controller) = self.bitrate.lock().as_mut() {
                controller.start();
            }
            let mut speech = self.speech.lock();
            if let Some(echo) = speech.echo.as_mut() {
                echo.initialize(AudioStreamInfo {
                    sample_rate: self.config.input_sample_rate,
                    channels: 1,
                });
                let bus = self.events.clone();
                echo.start(Box::new(move |metrics| {
                    bus.publish(SessionEvent::Echo(EchoEvent::Metrics(metrics)));
                }));
            }
        }

        info!(session_id = %self.config.transport.session_id, "session connecting");
        self.manager.connect().await?;
        Ok(())
    }

    /// Disconnect and release collaborators.
    ///
    /// Teardown runs in reverse dependency order: event pump, transport,
    /// echo monitor, bitrate controller. The echo monitor is disposed and not
    /// used by later connects.
    pub async fn disconnect(&self) {
        let from = self.manager.state();

        let pump = self.pump.lock().take();
        if let Some(pump) = pump {
            pump.cancel.cancel();
            let _ = pump.join.await;
        }

        self.manager.disconnect(false).await;

        {
            let mut speech = self.speech.lock();
            if let Some(mut echo) = speech.echo.take() {
                echo.dispose();
            }
            speech.handler.reset();
            speech.ai_speaking = false;
            speech.user_speaking = false;
            speech.ai_at_speech_start = false;
        }

        if let Some(controller) = self.bitrate.lock().as_mut() {
            controller.stop();
        }

        self.sequence.store(0, Ordering::Relaxed);
        self.frames_sent.store(0, Ordering::Relaxed);
        info!(session_id = %self.config.transport.session_id, "session disconnected");

        if from != ConnectionState::Disconnected {
            self.events.publish(SessionEvent::StateChanged {
                from,
                to: ConnectionState::Disconnected,
            });
        }
    }

    /// Send a JSON control message.
    pub async fn send(&self, message: Value) -> SessionResult<()> {
        self.manager.send(message).await?;
        Ok(())
    }

    /// Send captured mono audio. Returns the frame sequence number used.
    pub async fn send_audio(&self, samples: &[f32], captured_rate: u32) -> SessionResult<u32> {
        let state = self.manager.state();
        if state != ConnectionState::Ready {
            return Err(TransportError::NotReady(state).into());
        }

        let (payload, frame_type) = self.encode_audio(samples, captured_rate);
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.manager
            .send_binary(Bytes::from(payload), frame_type, sequence)
            .await?;
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        Ok(sequence)
    }

    fn encode_audio(&self, samples: &[f32], captured_rate: u32) -> (Vec<u8>, FrameType) {
        let mut bitrate = self.bitrate.lock();
        let Some(controller) = bitrate.as_mut() else {
            let pcm = if captured_rate == DEFAULT_SAMPLE_RATE {
                codec::quantize_pcm16(samples)
            } else {
                let resampled = codec::resample(samples, captured_rate, DEFAULT_SAMPLE_RATE);
                codec::quantize_pcm16(&resampled)
            };
            return (pcm, FrameType::AudioIn);
        };

        let profile = controller.current_profile();
        let pcm = if profile.sample_rate == captured_rate {
            controller.quantize(samples)
        } else {
            let resampled = controller.resample(samples, captured_rate, profile.sample_rate);
            controller.quantize(&resampled)
        };

        if profile.codec == AudioCodec::Opus
            && let Some(encoded) = controller.encode(&pcm, profile)
        {
            return (encoded, FrameType::AudioInOpus);
        }
        (pcm, FrameType::AudioIn)
    }

    /// AI playback started or stopped.
    pub fn set_ai_speaking(&self, speaking: bool) {
        let ended = {
            let mut speech = self.speech.lock();
            if speech.ai_speaking == speaking {
                return;
            }
            speech.ai_speaking = speaking;
            if let Some(echo) = speech.echo.as_mut() {
                if speaking {
                    echo.notify_output_started();
                } else {
                    echo.notify_output_stopped();
                }
            }
            let input = OverlapInput::new(speech.user_speaking, speaking, Instant::now());
            speech.handler.update(input).ended
        };

        if let Some(event) = ended {
            self.events.publish(SessionEvent::OverlapEnded(event));
        }
    }

    /// Feed a speech signal from the upstream VAD/STT.
    ///
    /// The utterance is classified against whether the AI was playing when
    /// it began. While the AI plays, the echo monitor then scales the VAD
    /// confidence by its sensitivity multiplier, and caps it below the
    /// interrupt threshold when it vetoes barge-in.
    pub fn handle_speech(&self, signal: SpeechSignal) -> SpeechOutcome {
        let (outcome, ended) = {
            let mut speech = self.speech.lock();
            if !speech.user_speaking {
                speech.user_speaking = true;
                speech.ai_at_speech_start = speech.ai_speaking;
            }
            let ai_speaking = speech.ai_speaking;

            let language = signal
                .language
                .clone()
                .unwrap_or_else(|| self.config.language.clone());
            let classification = self.classifier.classify(&ClassificationInput {
                transcript: signal.transcript.clone(),
                duration_ms: signal.duration_ms,
                language,
                vad_confidence: signal.vad_confidence,
                ai_was_playing: speech.ai_at_speech_start,
            });

            let mut vad = signal.vad_confidence.clamp(0.0, 1.0);
            if ai_speaking && let Some(echo) = speech.echo.as_ref() {
                let multiplier = echo.vad_sensitivity_multiplier();
                if multiplier > 0.0 {
                    vad = (vad / multiplier).clamp(0.0, 1.0);
                }
                if !echo.should_allow_barge_in() {
                    vad = vad.min(speech.handler.config().acknowledgment_threshold);
                }
            }

            let input = OverlapInput::new(true, ai_speaking, Instant::now())
                .vad(vad)
                .classification(classification.classification);
            let decision = speech.handler.update(input);

            let outcome = SpeechOutcome {
                classification,
                effective_vad: vad,
                action: decision.action,
                state: speech.handler.state(),
            };
            (outcome, decision.ended)
        };

        debug!(
            classification = %outcome.classification.classification,
            vad = outcome.effective_vad,
            action = ?outcome.action,
            "speech handled"
        );
        if let Some(event) = ended {
            self.events.publish(SessionEvent::OverlapEnded(event));
        }
        self.events.publish(SessionEvent::Overlap(outcome.clone()));
        outcome
    }

    /// The user stopped speaking.
    pub fn user_speech_ended(&self) {
        let ended = {
            let mut speech = self.speech.lock();
            speech.user_speaking = false;
            let input = OverlapInput::new(false, speech.ai_speaking, Instant::now());
            speech.handler.update(input).ended
        };
        if let Some(event) = ended {
            self.events.publish(SessionEvent::OverlapEnded(event));
        }
    }

    /// A tool call started; interrupts are held back until it finishes.
    pub fn tool_call_started(&self) {
        self.speech.lock().handler.tool_call_started();
    }

    /// A tool call finished.
    pub fn tool_call_finished(&self) {
        self.speech.lock().handler.tool_call_finished();
    }

    /// Swap in a new overlap policy.
    pub fn update_duplex_config(&self, update: &FullDuplexConfigUpdate) -> SessionResult<()> {
        self.speech.lock().handler.update_config(update)?;
        Ok(())
    }

    /// Start forwarding manager events. Returns `false` if already running.
    fn start_pump(&self) -> bool {
        let mut pump = self.pump.lock();
        if pump.is_some() {
            return false;
        }

        let mut subscription = self.manager.subscribe();
        let events = self.events.clone();
        let bitrate = Arc::clone(&self.bitrate);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let join = tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    event = subscription.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };

                if let TransportEvent::Quality(quality) = &event
                    && let Some(controller) = bitrate.lock().as_mut()
                {
                    controller.observe_network(quality.rtt_ms, quality.score);
                }

                match SessionEvent::from_transport(event) {
                    Some(event) => events.publish(event),
                    None => debug!("dropping inbound frame that is not playback audio"),
                }
            }
        });

        *pump = Some(Pump { cancel, join });
        true
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.get_mut().take() {
            pump.cancel.cancel();
        }
    }
}
