//! Overlap policy configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::ConfigError;

/// How overlapping speech is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapMode {
    /// The user wins as soon as VAD is confident.
    UserPriority,
    /// The AI keeps talking unless the user is very insistent.
    AiPriority,
    /// Wait out the detection delay, then decide on confidence and duration.
    #[default]
    Intelligent,
}

fn default_interrupt_threshold() -> f32 {
    0.7
}

fn default_acknowledgment_threshold() -> f32 {
    0.4
}

fn default_detection_delay_ms() -> u64 {
    200
}

fn default_max_overlap_ms() -> u64 {
    1500
}

fn default_duck_volume() -> f32 {
    0.3
}

fn default_gentle_duck_volume() -> f32 {
    0.6
}

fn default_sidetone_volume() -> f32 {
    0.1
}

fn default_true() -> bool {
    true
}

/// Immutable overlap policy snapshot.
///
/// The handler holds it behind an `Arc`; changes go through
/// [`FullDuplexConfig::apply`], which returns a new snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullDuplexConfig {
    /// Resolution policy.
    #[serde(default)]
    pub mode: OverlapMode,

    /// VAD confidence needed to interrupt.
    #[serde(default = "default_interrupt_threshold")]
    pub interrupt_threshold: f32,

    /// VAD confidence needed to duck.
    #[serde(default = "default_acknowledgment_threshold")]
    pub acknowledgment_threshold: f32,

    /// Time to wait after an overlap starts before acting.
    #[serde(default = "default_detection_delay_ms")]
    pub detection_delay_ms: u64,

    /// Overlap the AI-priority policy tolerates before interrupting.
    #[serde(default = "default_max_overlap_ms")]
    pub max_overlap_ms: u64,

    /// AI volume while ducked.
    #[serde(default = "default_duck_volume")]
    pub duck_volume: f32,

    /// AI volume while ducked under the AI-priority policy.
    #[serde(default = "default_gentle_duck_volume")]
    pub gentle_duck_volume: f32,

    /// Level at which the user's own voice is fed back while speaking.
    #[serde(default = "default_sidetone_volume")]
    pub sidetone_volume: f32,

    /// Never interrupt while a tool call is in flight.
    #[serde(default = "default_true")]
    pub respect_tool_boundaries: bool,
}

impl Default for FullDuplexConfig {
    fn default() -> Self {
        Self {
            mode: OverlapMode::default(),
            interrupt_threshold: default_interrupt_threshold(),
            acknowledgment_threshold: default_acknowledgment_threshold(),
            detection_delay_ms: default_detection_delay_ms(),
            max_overlap_ms: default_max_overlap_ms(),
            duck_volume: default_duck_volume(),
            gentle_duck_volume: default_gentle_duck_volume(),
            sidetone_volume: default_sidetone_volume(),
            respect_tool_boundaries: true,
        }
    }
}

/// Partial update merged over an existing snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct FullDuplexConfigUpdate {
    pub mode: Option<OverlapMode>,
    pub interrupt_threshold: Option<f32>,
    pub acknowledgment_threshold: Option<f32>,
    pub detection_delay_ms: Option<u64>,
    pub max_overlap_ms: Option<u64>,
    pub duck_volume: Option<f32>,
    pub gentle_duck_volume: Option<f32>,
    pub sidetone_volume: Option<f32>,
    pub respect_tool_boundaries: Option<bool>,
}

impl FullDuplexConfig {
    /// Builder: set the overlap mode.
    pub fn with_mode(mut self, mode: OverlapMode) -> Self {
        self.mode = mode;
        self
    }

    /// Builder: set the interrupt threshold.
    pub fn with_interrupt_threshold(mut self, threshold: f32) -> Self {
        self.interrupt_threshold = threshold;
        self
    }

    /// Builder: set the detection delay.
    pub fn with_detection_delay(mut self, delay: Duration) -> Self {
        self.detection_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Builder: set whether tool calls block interrupts.
    pub fn with_respect_tool_boundaries(mut self, respect: bool) -> Self {
        self.respect_tool_boundaries = respect;
        self
    }

    /// Detection delay as a duration.
    pub fn detection_delay(&self) -> Duration {
        Duration::from_millis(self.detection_delay_ms)
    }

    /// Maximum tolerated overlap as a duration.
    pub fn max_overlap(&self) -> Duration {
        Duration::from_millis(self.max_overlap_ms)
    }

    /// New snapshot with `update` merged over `self`.
    pub fn apply(&self, update: &FullDuplexConfigUpdate) -> Self {
        Self {
            mode: update.mode.unwrap_or(self.mode),
            interrupt_threshold: update.interrupt_threshold.unwrap_or(self.interrupt_threshold),
            acknowledgment_threshold: update
                .acknowledgment_threshold
                .unwrap_or(self.acknowledgment_threshold),
            detection_delay_ms: update.detection_delay_ms.unwrap_or(self.detection_delay_ms),
            max_overlap_ms: update.max_overlap_ms.unwrap_or(self.max_overlap_ms),
            duck_volume: update.duck_volume.unwrap_or(self.duck_volume),
            gentle_duck_volume: update.gentle_duck_volume.unwrap_or(self.gentle_duck_volume),
            sidetone_volume: update.sidetone_volume.unwrap_or(self.sidetone_volume),
            respect_tool_boundaries: update
                .respect_tool_boundaries
                .unwrap_or(self.respect_tool_boundaries),
        }
    }

    /// Reject thresholds and volumes outside `[0, 1]`, and an acknowledgment
    /// threshold above the interrupt threshold.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit = [
            ("interrupt_threshold", self.interrupt_threshold),
            ("acknowledgment_threshold", self.acknowledgment_threshold),
            ("duck_volume", self.duck_volume),
            ("gentle_duck_volume", self.gentle_duck_volume),
            ("sidetone_volume", self.sidetone_volume),
        ];
        for (field, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::invalid(field, format!("{value} is outside [0, 1]")));
            }
        }

        if self.acknowledgment_threshold > self.interrupt_threshold {
            return Err(ConfigError::invalid(
                "acknowledgment_threshold",
                "must not exceed interrupt_threshold",
            ));
        }
        Ok(())
    }
}
