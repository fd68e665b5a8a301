//! Session events and speech input.

use std::time::Duration;

use serde_json::Value;

use crate::classifier::ClassificationResult;
use crate::core::{AudioProfile, EchoEvent};
use crate::duplex::{DuplexState, OverlapAction, OverlapEvent, OverlapStatistics};
use crate::transport::{
    BinaryFrame, ConnectionState, TransportErrorKind, TransportEvent, TransportKind,
    TransportMetrics, TransportQuality,
};

/// Speech detected by the upstream VAD/STT.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechSignal {
    /// Transcript so far; may be empty.
    pub transcript: String,
    /// How long the user has been speaking.
    pub duration_ms: u64,
    /// VAD confidence (0.0 - 1.0).
    pub vad_confidence: f32,
    /// Language of the speech, if known.
    pub language: Option<String>,
}

impl SpeechSignal {
    /// Signal with no language hint.
    pub fn new(transcript: impl Into<String>, duration_ms: u64, vad_confidence: f32) -> Self {
        Self {
            transcript: transcript.into(),
            duration_ms,
            vad_confidence,
            language: None,
        }
    }

    /// Set the language.
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// Result of feeding one [`SpeechSignal`] through the session.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechOutcome {
    /// Classification of the utterance.
    pub classification: ClassificationResult,
    /// VAD confidence after echo compensation.
    pub effective_vad: f32,
    /// What the audio path should do.
    pub action: OverlapAction,
    /// Duplex state after the update.
    pub state: DuplexState,
}

/// Everything a session reports.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Transport state changed.
    StateChanged {
        /// Previous state.
        from: ConnectionState,
        /// New state.
        to: ConnectionState,
    },
    /// Application control message from the server.
    Message(Value),
    /// Synthesized audio from the server.
    Audio(BinaryFrame),
    /// New link quality sample.
    Quality(TransportQuality),
    /// A reconnection attempt is scheduled.
    Reconnecting {
        /// 1-based attempt number.
        attempt: u32,
        /// Wait before the attempt.
        delay: Duration,
    },
    /// The active transport was replaced.
    TransportSwitched {
        /// Previous link kind.
        from: TransportKind,
        /// New link kind.
        to: TransportKind,
        /// Why.
        reason: String,
    },
    /// Transport failure.
    Error {
        /// Category.
        kind: TransportErrorKind,
        /// Description.
        message: String,
    },
    /// Overlap decision for a speech signal.
    Overlap(SpeechOutcome),
    /// An overlap ended and was recorded.
    OverlapEnded(OverlapEvent),
    /// Echo monitor report.
    Echo(EchoEvent),
    /// The bitrate controller chose a new profile.
    ProfileChanged(AudioProfile),
}

impl SessionEvent {
    /// Map a transport event. Inbound frames that are not server audio map to
    /// `None`.
    pub fn from_transport(event: TransportEvent) -> Option<Self> {
        Some(match event {
            TransportEvent::StateChanged { from, to } => Self::StateChanged { from, to },
            TransportEvent::Message(value) => Self::Message(value),
            TransportEvent::Audio(frame) if frame.frame_type.is_outbound_audio() => {
                Self::Audio(frame)
            }
            TransportEvent::Audio(_) => return None,
            TransportEvent::Quality(quality) => Self::Quality(quality),
            TransportEvent::Reconnecting { attempt, delay } => Self::Reconnecting { attempt, delay },
            TransportEvent::Error { kind, message } => Self::Error { kind, message },
            TransportEvent::TransportSwitched { from, to, reason } => {
                Self::TransportSwitched { from, to, reason }
            }
        })
    }
}

/// Session-wide counters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SessionStatistics {
    /// Overlap aggregates.
    pub overlap: OverlapStatistics,
    /// Metrics of the active transport.
    pub transport: TransportMetrics,
    /// Audio frames sent since connect.
    pub audio_frames_sent: u64,
    /// Kind of the active transport.
    pub active_transport: Option<TransportKind>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::FrameType;

    #[test]
    fn test_only_server_audio_is_forwarded() {
        let out = BinaryFrame::new(FrameType::AudioOut, 1, vec![0u8; 4]);
        let echo = BinaryFrame::new(FrameType::AudioIn, 1, vec![0u8; 4]);

        assert_eq!(
            SessionEvent::from_transport(TransportEvent::Audio(out.clone())),
            Some(SessionEvent::Audio(out))
        );
        assert_eq!(
            SessionEvent::from_transport(TransportEvent::Audio(echo)),
            None
        );
    }

    #[test]
    fn test_signal_builder() {
        let signal = SpeechSignal::new("wait", 300, 0.8).language("de");
        assert_eq!(signal.language.as_deref(), Some("de"));
    }
}
