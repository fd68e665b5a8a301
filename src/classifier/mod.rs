//! Barge-in classification.
//!
//! Decides whether speech detected while the AI is talking is a backchannel
//! ("uh-huh"), a request to pause (soft barge) or a real interruption (hard
//! barge). Classification is a pure function of its input, the classifier
//! configuration and the phrase table; it never fails.
//!
//! # Priority
//!
//! ```text
//! AI not playing            -> hard_barge (1.0)
//! empty + too short         -> unclear
//! backchannel phrase        -> backchannel   (if short enough)
//! pause phrase              -> soft_barge
//! long enough               -> hard_barge
//! too short                 -> unclear
//! medium, low VAD           -> soft_barge
//! otherwise                 -> unclear
//! ```

mod classify;
pub mod fuzzy;
mod phrases;

pub use classify::*;
pub use phrases::{LanguagePhrases, PhraseTable, language_key};

use serde::{Deserialize, Serialize};

/// Outcome category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Acknowledgment; the AI keeps talking.
    Backchannel,
    /// Request to pause.
    SoftBarge,
    /// Interruption; the AI must stop.
    HardBarge,
    /// Not enough evidence yet.
    Unclear,
}

impl Classification {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Backchannel => "backchannel",
            Self::SoftBarge => "soft_barge",
            Self::HardBarge => "hard_barge",
            Self::Unclear => "unclear",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classification request.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationInput {
    /// Partial or final transcript of the new speech.
    pub transcript: String,
    /// How long the user has been speaking.
    pub duration_ms: u64,
    /// Language code, e.g. `"en"` or `"es-MX"`.
    pub language: String,
    /// VAD confidence for the speech (0.0 - 1.0).
    pub vad_confidence: f32,
    /// Whether AI audio was playing when the speech started.
    pub ai_was_playing: bool,
}

impl ClassificationInput {
    /// English speech over AI playback with full VAD confidence.
    pub fn new(transcript: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            transcript: transcript.into(),
            duration_ms,
            language: "en".to_string(),
            vad_confidence: 1.0,
            ai_was_playing: true,
        }
    }

    /// Set the language.
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Set the VAD confidence.
    pub fn vad_confidence(mut self, confidence: f32) -> Self {
        self.vad_confidence = confidence;
        self
    }

    /// Set whether the AI was playing.
    pub fn ai_was_playing(mut self, playing: bool) -> Self {
        self.ai_was_playing = playing;
        self
    }
}

/// Classification outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Category.
    pub classification: Classification,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
    /// Human-readable explanation, for logs.
    pub reason: String,
    /// Phrase that matched, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_phrase: Option<String>,
    /// Edit distance of a fuzzy match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_distance: Option<usize>,
}

impl ClassificationResult {
    pub(crate) fn new(classification: Classification, confidence: f32, reason: impl Into<String>) -> Self {
        Self {
            classification,
            confidence: confidence.clamp(0.0, 1.0),
            reason: reason.into(),
            matched_phrase: None,
            match_distance: None,
        }
    }

    /// Whether the speech was an acknowledgment.
    pub fn is_backchannel(&self) -> bool {
        self.classification == Classification::Backchannel
    }
}
