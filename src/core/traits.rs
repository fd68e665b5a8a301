//! Collaborator interfaces consumed by the session layer.
//!
//! Echo cancellation and bitrate adaptation live outside this crate. The
//! session only talks to them through these traits, so applications can plug
//! in their own implementations (or none at all).

use super::codec;

/// Audio codec carried in binary frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioCodec {
    /// 16-bit little-endian PCM.
    #[default]
    Pcm16,
    /// Opus packets produced by the bitrate controller.
    Opus,
}

/// Target encoding for outgoing audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioProfile {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Codec for outgoing frames.
    pub codec: AudioCodec,
}

impl Default for AudioProfile {
    fn default() -> Self {
        Self {
            sample_rate: super::DEFAULT_SAMPLE_RATE,
            codec: AudioCodec::Pcm16,
        }
    }
}

/// Description of the captured input stream handed to the echo monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioStreamInfo {
    /// Capture sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: u8,
}

impl Default for AudioStreamInfo {
    fn default() -> Self {
        Self {
            sample_rate: super::DEFAULT_SAMPLE_RATE,
            channels: 1,
        }
    }
}

/// Periodic measurements from the echo monitor.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EchoMetrics {
    /// Estimated echo return loss enhancement in dB.
    pub erle_db: f32,
    /// Level of AI audio leaking into the microphone (0.0 - 1.0).
    pub echo_level: f32,
    /// Whether both sides appear to be talking.
    pub double_talk: bool,
}

/// Everything the echo monitor can report.
#[derive(Debug, Clone, PartialEq)]
pub enum EchoEvent {
    /// New metrics sample.
    Metrics(EchoMetrics),
    /// Echo strong enough to be mistaken for user speech.
    EchoDetected {
        /// Leak level (0.0 - 1.0).
        level: f32,
    },
    /// The monitor changed its VAD sensitivity multiplier.
    SensitivityChanged {
        /// New multiplier.
        multiplier: f32,
    },
}

/// Callback receiving echo metrics.
pub type EchoMetricsCallback = Box<dyn Fn(EchoMetrics) + Send + Sync>;

/// Callback receiving every echo event.
pub type EchoEventCallback = Box<dyn Fn(&EchoEvent) + Send + Sync>;

/// Callback receiving a new audio profile chosen by the bitrate controller.
pub type ProfileCallback = Box<dyn Fn(AudioProfile) + Send + Sync>;

/// Acoustic echo feedback monitor.
pub trait EchoFeedbackMonitor: Send {
    /// Attach the monitor to the capture stream.
    fn initialize(&mut self, input: AudioStreamInfo);

    /// Begin monitoring; `on_metrics` receives periodic samples.
    fn start(&mut self, on_metrics: EchoMetricsCallback);

    /// AI playback started.
    fn notify_output_started(&mut self);

    /// AI playback stopped.
    fn notify_output_stopped(&mut self);

    /// Factor applied to the VAD threshold while echo is present (1.0 = neutral).
    fn vad_sensitivity_multiplier(&self) -> f32;

    /// Whether user speech right now is trustworthy enough to barge in.
    fn should_allow_barge_in(&self) -> bool;

    /// Subscribe to every event the monitor emits.
    fn on_all(&mut self, callback: EchoEventCallback);

    /// Release resources. The monitor is not used afterwards.
    fn dispose(&mut self);
}

/// Network-adaptive audio bitrate controller.
pub trait BitrateController: Send {
    /// Begin adapting.
    fn start(&mut self);

    /// Stop adapting.
    fn stop(&mut self);

    /// Current target profile.
    fn current_profile(&self) -> AudioProfile;

    /// Register a callback for profile changes.
    fn on_quality_change(&mut self, callback: ProfileCallback);

    /// Feed a transport quality sample. Ignored by default.
    fn observe_network(&mut self, rtt_ms: f64, score: u8) {
        let _ = (rtt_ms, score);
    }

    /// Resample mono f32 samples.
    fn resample(&self, samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
        codec::resample(samples, from_rate, to_rate)
    }

    /// Quantize f32 samples into 16-bit little-endian PCM bytes.
    fn quantize(&self, samples: &[f32]) -> Vec<u8> {
        codec::quantize_pcm16(samples)
    }

    /// Encode quantized PCM into the profile codec.
    ///
    /// Returns `None` when the controller cannot encode, in which case the
    /// PCM bytes are sent as-is.
    fn encode(&mut self, pcm: &[u8], profile: AudioProfile) -> Option<Vec<u8>> {
        let _ = (pcm, profile);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedController(AudioProfile);

    impl BitrateController for FixedController {
        fn start(&mut self) {}
        fn stop(&mut self) {}
        fn current_profile(&self) -> AudioProfile {
            self.0
        }
        fn on_quality_change(&mut self, _callback: ProfileCallback) {}
    }

    #[test]
    fn test_default_profile() {
        let profile = AudioProfile::default();
        assert_eq!(profile.sample_rate, 16_000);
        assert_eq!(profile.codec, AudioCodec::Pcm16);
    }

    #[test]
    fn test_controller_default_codec_utilities() {
        let mut controller = FixedController(AudioProfile::default());
        let resampled = controller.resample(&[0.0; 480], 48_000, 16_000);
        assert_eq!(resampled.len(), 160);

        let pcm = controller.quantize(&[0.0, 1.0]);
        assert_eq!(pcm.len(), 4);
        assert!(controller.encode(&pcm, AudioProfile::default()).is_none());
    }
}
