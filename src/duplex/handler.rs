//! Overlap handler.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::config::{FullDuplexConfig, FullDuplexConfigUpdate, OverlapMode};
use super::history::{OverlapEvent, OverlapHistory, OverlapResolution, OverlapStatistics};
use crate::classifier::Classification;
use crate::core::{AI_PRIORITY_INTERRUPT_CONFIDENCE, ConfigError, MIN_INTERRUPT_OVERLAP};

/// What the audio path should do with AI playback.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OverlapAction {
    /// Keep playing at full volume.
    Continue,
    /// Lower AI volume.
    Duck {
        /// Target volume (0.0 - 1.0).
        volume: f32,
    },
    /// Stop AI playback.
    Interrupt,
    /// Undecided; keep playing while evidence accumulates.
    Wait,
}

impl OverlapAction {
    fn resolution(self) -> OverlapResolution {
        match self {
            Self::Continue | Self::Wait => OverlapResolution::Continued,
            Self::Duck { .. } => OverlapResolution::Ducked,
            Self::Interrupt => OverlapResolution::Interrupted,
        }
    }

    fn ai_volume(self) -> f32 {
        match self {
            Self::Continue | Self::Wait => 1.0,
            Self::Duck { volume } => volume,
            Self::Interrupt => 0.0,
        }
    }
}

/// Who is currently producing audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveStream {
    /// Silence.
    #[default]
    None,
    /// Only the user.
    User,
    /// Only the AI.
    Ai,
    /// Both at once.
    Both,
}

/// Derived duplex state, recomputed after every update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DuplexState {
    /// User is speaking.
    pub user_speaking: bool,
    /// AI audio is playing.
    pub ai_speaking: bool,
    /// Both are speaking.
    pub is_overlap: bool,
    /// Length of the current overlap.
    pub overlap_duration: Duration,
    /// Who is audible.
    pub active_stream: ActiveStream,
    /// A tool call is running.
    pub tool_call_in_progress: bool,
    /// Volume applied to AI playback.
    pub ai_volume: f32,
    /// Volume of the user's sidetone.
    pub sidetone_volume: f32,
}

impl Default for DuplexState {
    fn default() -> Self {
        Self {
            user_speaking: false,
            ai_speaking: false,
            is_overlap: false,
            overlap_duration: Duration::ZERO,
            active_stream: ActiveStream::None,
            tool_call_in_progress: false,
            ai_volume: 1.0,
            sidetone_volume: 0.0,
        }
    }
}

/// Speaking flags and signals for one update.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlapInput {
    /// User is speaking.
    pub user_speaking: bool,
    /// AI audio is playing.
    pub ai_speaking: bool,
    /// Current VAD confidence.
    pub vad_confidence: f32,
    /// Latest classification of the user's speech, if any.
    pub classification: Option<Classification>,
    /// Time of the update.
    pub now: Instant,
}

impl OverlapInput {
    /// Update with no VAD confidence and no classification.
    pub fn new(user_speaking: bool, ai_speaking: bool, now: Instant) -> Self {
        Self {
            user_speaking,
            ai_speaking,
            vad_confidence: 0.0,
            classification: None,
            now,
        }
    }

    /// Set the VAD confidence.
    pub fn vad(mut self, confidence: f32) -> Self {
        self.vad_confidence = confidence;
        self
    }

    /// Set the classification.
    pub fn classification(mut self, classification: Classification) -> Self {
        self.classification = Some(classification);
        self
    }

    fn is_backchannel(&self) -> bool {
        self.classification == Some(Classification::Backchannel)
    }
}

/// Result of one update.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlapDecision {
    /// What to do with AI audio.
    pub action: OverlapAction,
    /// The overlap that ended with this update, if any.
    pub ended: Option<OverlapEvent>,
}

#[derive(Debug, Clone)]
struct ActiveOverlap {
    start: Instant,
    start_vad: f32,
    was_backchannel: bool,
    resolution: OverlapResolution,
}

/// Stateful duplex coordinator.
///
/// Owned by one session and driven from a single task. Time is supplied by the
/// caller on every update.
#[derive(Debug)]
pub struct OverlapHandler {
    config: Arc<FullDuplexConfig>,
    user_speaking: bool,
    ai_speaking: bool,
    tool_calls: u32,
    overlap: Option<ActiveOverlap>,
    last_action: OverlapAction,
    state: DuplexState,
    history: OverlapHistory,
    statistics: OverlapStatistics,
}

impl Default for OverlapHandler {
    fn default() -> Self {
        Self::new(FullDuplexConfig::default())
    }
}

impl OverlapHandler {
    /// Create a handler with the given policy.
    pub fn new(config: FullDuplexConfig) -> Self {
        Self {
            config: Arc::new(config),
            user_speaking: false,
            ai_speaking: false,
            tool_calls: 0,
            overlap: None,
            last_action: OverlapAction::Continue,
            state: DuplexState::default(),
            history: OverlapHistory::default(),
            statistics: OverlapStatistics::default(),
        }
    }

    /// Current policy snapshot.
    pub fn config(&self) -> Arc<FullDuplexConfig> {
        Arc::clone(&self.config)
    }

    /// Merge `update` into the policy. The old snapshot is kept on error.
    pub fn update_config(
        &mut self,
        update: &FullDuplexConfigUpdate,
    ) -> Result<Arc<FullDuplexConfig>, ConfigError> {
        let next = self.config.apply(update);
        next.validate()?;
        self.config = Arc::new(next);
        Ok(self.config())
    }

    /// Current derived state.
    pub fn state(&self) -> DuplexState {
        self.state
    }

    /// Statistics over the retained history.
    pub fn statistics(&self) -> OverlapStatistics {
        self.statistics
    }

    /// Retained overlap events.
    pub fn history(&self) -> &OverlapHistory {
        &self.history
    }

    /// Last action returned.
    pub fn last_action(&self) -> OverlapAction {
        self.last_action
    }

    /// A tool call started.
    pub fn tool_call_started(&mut self) {
        self.tool_calls = self.tool_calls.saturating_add(1);
        self.state.tool_call_in_progress = true;
    }

    /// A tool call finished.
    pub fn tool_call_finished(&mut self) {
        self.tool_calls = self.tool_calls.saturating_sub(1);
        self.state.tool_call_in_progress = self.tool_calls > 0;
    }

    /// Whether a tool call is in flight.
    pub fn tool_call_in_progress(&self) -> bool {
        self.tool_calls > 0
    }

    /// Feed new speaking flags and signals.
    pub fn update(&mut self, input: OverlapInput) -> OverlapDecision {
        self.user_speaking = input.user_speaking;
        self.ai_speaking = input.ai_speaking;
        let both = input.user_speaking && input.ai_speaking;

        let (action, ended) = match (self.overlap.is_some(), both) {
            (false, true) => (self.begin_overlap(&input), None),
            (true, true) => (self.continue_overlap(&input), None),
            (true, false) => (OverlapAction::Continue, self.end_overlap(input.now)),
            (false, false) => (OverlapAction::Continue, None),
        };

        self.last_action = action;
        self.refresh_state(input.now);
        OverlapDecision { action, ended }
    }

    /// Clear history, statistics and any open overlap.
    pub fn reset(&mut self) {
        self.user_speaking = false;
        self.ai_speaking = false;
        self.tool_calls = 0;
        self.overlap = None;
        self.last_action = OverlapAction::Continue;
        self.history.clear();
        self.statistics = OverlapStatistics::default();
        self.state = DuplexState::default();
    }

    fn tool_guard(&self) -> bool {
        self.config.respect_tool_boundaries && self.tool_call_in_progress()
    }

    fn begin_overlap(&mut self, input: &OverlapInput) -> OverlapAction {
        let backchannel = input.is_backchannel();
        let action = if backchannel {
            OverlapAction::Continue
        } else if self.tool_guard() {
            OverlapAction::Duck {
                volume: self.config.duck_volume,
            }
        } else {
            OverlapAction::Wait
        };

        debug!(
            vad = input.vad_confidence,
            backchannel,
            tool_call = self.tool_call_in_progress(),
            ?action,
            "overlap started"
        );

        self.overlap = Some(ActiveOverlap {
            start: input.now,
            start_vad: input.vad_confidence,
            was_backchannel: backchannel,
            resolution: action.resolution(),
        });
        action
    }

    fn continue_overlap(&mut self, input: &OverlapInput) -> OverlapAction {
        let Some(overlap) = self.overlap.as_ref() else {
            return OverlapAction::Continue;
        };
        let elapsed = input.now.saturating_duration_since(overlap.start);
        let backchannel = input.is_backchannel();

        let action = if overlap.resolution == OverlapResolution::Interrupted {
            // AI playback is already stopped for this overlap.
            OverlapAction::Interrupt
        } else if backchannel {
            OverlapAction::Continue
        } else {
            let action = self.policy(input.vad_confidence, elapsed);
            if action == OverlapAction::Interrupt && self.tool_guard() {
                OverlapAction::Duck {
                    volume: self.config.duck_volume,
                }
            } else {
                action
            }
        };

        if let Some(overlap) = self.overlap.as_mut() {
            overlap.was_backchannel |= backchannel;
            overlap.resolution = overlap.resolution.max(action.resolution());
        }
        action
    }

    fn policy(&self, vad: f32, elapsed: Duration) -> OverlapAction {
        let cfg = &self.config;
        match cfg.mode {
            OverlapMode::UserPriority => {
                if vad >= cfg.interrupt_threshold {
                    OverlapAction::Interrupt
                } else {
                    OverlapAction::Duck {
                        volume: cfg.duck_volume,
                    }
                }
            }
            OverlapMode::AiPriority => {
                if vad >= AI_PRIORITY_INTERRUPT_CONFIDENCE && elapsed > cfg.max_overlap() {
                    OverlapAction::Interrupt
                } else {
                    OverlapAction::Duck {
                        volume: cfg.gentle_duck_volume,
                    }
                }
            }
            OverlapMode::Intelligent => {
                if elapsed < cfg.detection_delay() {
                    OverlapAction::Wait
                } else if vad >= cfg.interrupt_threshold && elapsed > MIN_INTERRUPT_OVERLAP {
                    OverlapAction::Interrupt
                } else if vad >= cfg.acknowledgment_threshold {
                    OverlapAction::Duck {
                        volume: cfg.duck_volume,
                    }
                } else {
                    OverlapAction::Continue
                }
            }
        }
    }

    fn end_overlap(&mut self, now: Instant) -> Option<OverlapEvent> {
        let overlap = self.overlap.take()?;
        let resolution = if overlap.was_backchannel {
            overlap.resolution.max(OverlapResolution::Backchannel)
        } else {
            overlap.resolution
        };

        let event = OverlapEvent {
            start_time: overlap.start,
            duration: now.saturating_duration_since(overlap.start),
            vad_confidence: overlap.start_vad,
            was_backchannel: overlap.was_backchannel,
            resolution,
        };
        debug!(
            duration_ms = event.duration.as_millis() as u64,
            ?resolution,
            "overlap ended"
        );

        self.history.push(event.clone());
        self.statistics = self.history.statistics();
        Some(event)
    }

    fn refresh_state(&mut self, now: Instant) {
        let active_stream = match (self.user_speaking, self.ai_speaking) {
            (false, false) => ActiveStream::None,
            (true, false) => ActiveStream::User,
            (false, true) => ActiveStream::Ai,
            (true, true) => ActiveStream::Both,
        };
        let overlap_duration = self
            .overlap
            .as_ref()
            .map(|o| now.saturating_duration_since(o.start))
            .unwrap_or_default();

        self.state = DuplexState {
            user_speaking: self.user_speaking,
            ai_speaking: self.ai_speaking,
            is_overlap: self.overlap.is_some(),
            overlap_duration,
            active_stream,
            tool_call_in_progress: self.tool_call_in_progress(),
            ai_volume: self.last_action.ai_volume(),
            sidetone_volume: if self.user_speaking {
                self.config.sidetone_volume
            } else {
                0.0
            },
        };
    }
}
