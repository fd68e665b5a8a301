//! The classifier itself.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::fuzzy::{self, MatchKind, PhraseMatch};
use super::{Classification, ClassificationInput, ClassificationResult, PhraseTable};
use crate::core::ConfigError;

/// Confidence constants.
pub mod confidence {
    /// AI was not playing; the speech is an ordinary turn.
    pub const NOT_PLAYING: f32 = 1.0;
    /// Exact backchannel match.
    pub const BACKCHANNEL_EXACT: f32 = 0.95;
    /// Exact soft-barge match.
    pub const SOFT_BARGE_EXACT: f32 = 0.9;
    /// Lost per edit-distance unit (and once for a contained match).
    pub const PER_EDIT: f32 = 0.1;
    /// Base confidence at the hard-barge threshold.
    pub const HARD_BARGE_BASE: f32 = 0.7;
    /// Added when duration reaches twice the hard-barge threshold.
    pub const HARD_BARGE_SPAN: f32 = 0.25;
    /// Cap for duration-based hard barges.
    pub const HARD_BARGE_CAP: f32 = 0.95;
    /// Empty transcript, too little audio.
    pub const AWAITING_SPEECH: f32 = 0.3;
    /// Non-empty but too short to tell.
    pub const TOO_SHORT: f32 = 0.4;
    /// Medium duration, hesitant voice.
    pub const HESITANT: f32 = 0.6;
    /// Medium duration, nothing to go on.
    pub const AMBIGUOUS: f32 = 0.5;
}

fn default_speech_confirm_ms() -> u64 {
    200
}

fn default_backchannel_max_duration_ms() -> u64 {
    500
}

fn default_hard_barge_min_ms() -> u64 {
    400
}

fn default_max_edit_distance() -> usize {
    2
}

fn default_soft_barge_vad_ceiling() -> f32 {
    0.8
}

/// Classifier thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Speech shorter than this is not yet confirmed.
    #[serde(default = "default_speech_confirm_ms")]
    pub speech_confirm_ms: u64,

    /// Backchannel phrases only count when spoken within this duration.
    #[serde(default = "default_backchannel_max_duration_ms")]
    pub backchannel_max_duration_ms: u64,

    /// Unmatched speech at least this long is a hard barge.
    #[serde(default = "default_hard_barge_min_ms")]
    pub hard_barge_min_ms: u64,

    /// Upper bound on the fuzzy-match tolerance.
    #[serde(default = "default_max_edit_distance")]
    pub max_edit_distance: usize,

    /// Medium-length speech below this VAD confidence leans soft barge.
    #[serde(default = "default_soft_barge_vad_ceiling")]
    pub soft_barge_vad_ceiling: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            speech_confirm_ms: default_speech_confirm_ms(),
            backchannel_max_duration_ms: default_backchannel_max_duration_ms(),
            hard_barge_min_ms: default_hard_barge_min_ms(),
            max_edit_distance: default_max_edit_distance(),
            soft_barge_vad_ceiling: default_soft_barge_vad_ceiling(),
        }
    }
}

impl ClassifierConfig {
    /// Check thresholds for consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hard_barge_min_ms == 0 {
            return Err(ConfigError::invalid("hard_barge_min_ms", "must be positive"));
        }
        if self.speech_confirm_ms > self.hard_barge_min_ms {
            return Err(ConfigError::invalid(
                "speech_confirm_ms",
                "must not exceed hard_barge_min_ms",
            ));
        }
        if !(0.0..=1.0).contains(&self.soft_barge_vad_ceiling) {
            return Err(ConfigError::invalid(
                "soft_barge_vad_ceiling",
                "must be within [0, 1]",
            ));
        }
        Ok(())
    }
}

/// Stateless barge-in classifier.
///
/// Holds only immutable configuration; [`classify`](Self::classify) is safe to
/// call on every VAD frame.
#[derive(Debug, Clone)]
pub struct BargeInClassifier {
    config: ClassifierConfig,
    table: Arc<PhraseTable>,
}

impl Default for BargeInClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}

impl BargeInClassifier {
    /// Classifier using the built-in phrase table.
    pub fn new(config: ClassifierConfig) -> Self {
        Self::with_table(config, PhraseTable::builtin())
    }

    /// Classifier using a custom phrase table.
    pub fn with_table(config: ClassifierConfig, table: Arc<PhraseTable>) -> Self {
        Self { config, table }
    }

    /// Active configuration.
    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Active phrase table.
    pub fn table(&self) -> &PhraseTable {
        &self.table
    }

    /// Classify one speech segment.
    pub fn classify(&self, input: &ClassificationInput) -> ClassificationResult {
        let result = self.classify_inner(input);
        trace!(
            classification = %result.classification,
            confidence = result.confidence,
            duration_ms = input.duration_ms,
            table = %self.table.version,
            "classified speech"
        );
        result
    }

    fn classify_inner(&self, input: &ClassificationInput) -> ClassificationResult {
        let cfg = &self.config;

        if !input.ai_was_playing {
            return ClassificationResult::new(
                Classification::HardBarge,
                confidence::NOT_PLAYING,
                "AI was not playing; normal speech",
            );
        }

        let transcript = fuzzy::normalize(&input.transcript);
        let duration = input.duration_ms;

        if transcript.is_empty() && duration < cfg.speech_confirm_ms {
            return ClassificationResult::new(
                Classification::Unclear,
                confidence::AWAITING_SPEECH,
                "no transcript yet; waiting for more audio",
            );
        }

        let phrases = self.table.phrases(&input.language);

        if let Some(found) = fuzzy::best_match(&transcript, &phrases.backchannel, cfg.max_edit_distance)
            && duration <= cfg.backchannel_max_duration_ms
        {
            return phrase_result(
                Classification::Backchannel,
                confidence::BACKCHANNEL_EXACT,
                found,
                "backchannel phrase",
            );
        }

        if let Some(found) = fuzzy::best_match(&transcript, &phrases.soft_barge, cfg.max_edit_distance) {
            return phrase_result(
                Classification::SoftBarge,
                confidence::SOFT_BARGE_EXACT,
                found,
                "pause request",
            );
        }

        self.by_duration(duration, input.vad_confidence)
    }

    fn by_duration(&self, duration: u64, vad_confidence: f32) -> ClassificationResult {
        let cfg = &self.config;

        if duration >= cfg.hard_barge_min_ms {
            let min = cfg.hard_barge_min_ms as f32;
            let excess = (duration - cfg.hard_barge_min_ms) as f32 / min;
            let confidence = (confidence::HARD_BARGE_BASE + confidence::HARD_BARGE_SPAN * excess)
                .min(confidence::HARD_BARGE_CAP);
            return ClassificationResult::new(
                Classification::HardBarge,
                confidence,
                format!("sustained speech ({duration}ms)"),
            );
        }

        if duration < cfg.speech_confirm_ms {
            return ClassificationResult::new(
                Classification::Unclear,
                confidence::TOO_SHORT,
                format!("speech too short to confirm ({duration}ms)"),
            );
        }

        if vad_confidence < cfg.soft_barge_vad_ceiling {
            return ClassificationResult::new(
                Classification::SoftBarge,
                confidence::HESITANT,
                "medium-length hesitant speech",
            );
        }

        ClassificationResult::new(
            Classification::Unclear,
            confidence::AMBIGUOUS,
            "medium-length speech without a phrase match",
        )
    }
}

fn phrase_result(
    classification: Classification,
    exact: f32,
    found: PhraseMatch,
    label: &str,
) -> ClassificationResult {
    let (confidence, distance, how) = match found.kind {
        MatchKind::Exact => (exact, None, "exact"),
        MatchKind::Fuzzy(d) => (exact - confidence::PER_EDIT * d as f32, Some(d), "fuzzy"),
        MatchKind::Contained => (exact - confidence::PER_EDIT, None, "contained"),
    };

    let mut result = ClassificationResult::new(
        classification,
        confidence,
        format!("{how} {label} match: \"{}\"", found.phrase),
    );
    result.matched_phrase = Some(found.phrase);
    result.match_distance = distance;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> BargeInClassifier {
        BargeInClassifier::default()
    }

    #[test]
    fn test_not_playing_is_always_hard_barge() {
        for transcript in ["uh huh", "wait", "", "tell me more"] {
            let input = ClassificationInput::new(transcript, 100).ai_was_playing(false);
            let result = classifier().classify(&input);
            assert_eq!(result.classification, Classification::HardBarge);
            assert_eq!(result.confidence, 1.0);
        }
    }

    #[test]
    fn test_empty_short_transcript_is_unclear() {
        let result = classifier().classify(&ClassificationInput::new("", 120));
        assert_eq!(result.classification, Classification::Unclear);
        assert!(result.confidence < 0.5);
    }

    #[test]
    fn test_exact_backchannel() {
        let result = classifier().classify(&ClassificationInput::new("uh huh", 200));
        assert_eq!(result.classification, Classification::Backchannel);
        assert!(result.confidence >= 0.9);
        assert_eq!(result.matched_phrase.as_deref(), Some("uh huh"));
        assert_eq!(result.match_distance, None);
    }

    #[test]
    fn test_every_builtin_backchannel_is_recognised() {
        let classifier = classifier();
        let table = classifier.table();
        for language in table.languages() {
            for phrase in &table.phrases(language).backchannel {
                let input = ClassificationInput::new(phrase.as_str(), 200)
                    .language(language)
                    .vad_confidence(0.6);
                let result = classifier.classify(&input);
                assert_eq!(
                    result.classification,
                    Classification::Backchannel,
                    "{language}: {phrase:?} -> {}",
                    result.reason
                );
                assert!(result.confidence >= 0.9, "{language}: {phrase:?}");
            }
        }
    }

    #[test]
    fn test_every_builtin_pause_request_is_recognised() {
        let classifier = classifier();
        let table = classifier.table();
        // Longer than any backchannel, so only the pause list can match.
        let duration = ClassifierConfig::default().backchannel_max_duration_ms + 100;
        for language in table.languages() {
            for phrase in &table.phrases(language).soft_barge {
                let input = ClassificationInput::new(phrase.as_str(), duration)
                    .language(language)
                    .vad_confidence(0.6);
                let result = classifier.classify(&input);
                assert_eq!(
                    result.classification,
                    Classification::SoftBarge,
                    "{language}: {phrase:?} -> {}",
                    result.reason
                );
                assert!(result.confidence >= 0.9, "{language}: {phrase:?}");
                assert_eq!(result.matched_phrase.as_ref(), Some(phrase));
            }
        }
    }

    #[test]
    fn test_fuzzy_backchannel() {
        let result = classifier().classify(&ClassificationInput::new("uh hu", 200));
        assert_eq!(result.classification, Classification::Backchannel);
        assert!(result.confidence >= 0.6 && result.confidence < 0.9);
        assert_eq!(result.match_distance, Some(1));
    }

    #[test]
    fn test_backchannel_too_long_is_not_backchannel() {
        let result = classifier().classify(&ClassificationInput::new("uh huh", 900));
        assert_ne!(result.classification, Classification::Backchannel);
        assert_eq!(result.classification, Classification::HardBarge);
    }

    #[test]
    fn test_contained_backchannel() {
        let result = classifier().classify(&ClassificationInput::new("yeah okay sure thing", 450));
        assert_eq!(result.classification, Classification::Backchannel);
        assert!((result.confidence - 0.85).abs() < 1e-6);
    }

    #[test]
    fn test_soft_barge_phrase() {
        let result = classifier().classify(&ClassificationInput::new("wait", 250));
        assert_eq!(result.classification, Classification::SoftBarge);
        assert!((result.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_soft_barge_beats_duration() {
        let result = classifier().classify(&ClassificationInput::new("hold on", 1500));
        assert_eq!(result.classification, Classification::SoftBarge);
    }

    #[test]
    fn test_hard_barge_by_duration() {
        let input = ClassificationInput::new("actually I wanted to ask about something else", 500);
        let result = classifier().classify(&input);
        assert_eq!(result.classification, Classification::HardBarge);
        assert!(result.confidence > 0.7);
    }

    #[test]
    fn test_hard_barge_confidence_monotonic() {
        let c = classifier();
        let mut last = 0.0f32;
        for duration in (400..=1200).step_by(50) {
            let result = c.classify(&ClassificationInput::new("tell me about pricing", duration));
            assert_eq!(result.classification, Classification::HardBarge);
            assert!(result.confidence > last || result.confidence == confidence::HARD_BARGE_CAP);
            assert!(result.confidence <= confidence::HARD_BARGE_CAP);
            last = result.confidence;
        }
    }

    #[test]
    fn test_medium_duration_fallbacks() {
        let c = classifier();
        let hesitant = c.classify(&ClassificationInput::new("tell me", 300).vad_confidence(0.5));
        assert_eq!(hesitant.classification, Classification::SoftBarge);
        assert!((hesitant.confidence - 0.6).abs() < 1e-6);

        let confident = c.classify(&ClassificationInput::new("tell me", 300).vad_confidence(0.95));
        assert_eq!(confident.classification, Classification::Unclear);
        assert!((confident.confidence - 0.5).abs() < 1e-6);

        let short = c.classify(&ClassificationInput::new("tell me", 100));
        assert_eq!(short.classification, Classification::Unclear);
    }

    #[test]
    fn test_other_languages() {
        let c = classifier();
        let es = c.classify(&ClassificationInput::new("Vale", 250).language("es-ES"));
        assert_eq!(es.classification, Classification::Backchannel);

        let ja = c.classify(&ClassificationInput::new("ちょっと待って", 300).language("ja"));
        assert_eq!(ja.classification, Classification::SoftBarge);

        let de = c.classify(&ClassificationInput::new("Moment", 300).language("de"));
        assert_eq!(de.classification, Classification::SoftBarge);
    }

    #[test]
    fn test_classification_is_pure() {
        let c = classifier();
        let input = ClassificationInput::new("uh hu", 200).vad_confidence(0.7);
        assert_eq!(c.classify(&input), c.classify(&input));
    }

    #[test]
    fn test_config_validation() {
        assert!(ClassifierConfig::default().validate().is_ok());
        let bad = ClassifierConfig {
            speech_confirm_ms: 800,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
