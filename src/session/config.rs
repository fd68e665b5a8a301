//! Session configuration.
//!
//! One TOML document configures a whole session:
//!
//! ```toml
//! language = "es"
//! echo_monitoring = true
//!
//! [transport]
//! user_id = "u-17"
//! heartbeat_interval_ms = 10000
//!
//! [manager]
//! ws_url = "wss://voice.example.com/session"
//! strategy = "adaptive"
//!
//! [duplex]
//! mode = "user_priority"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::classifier::ClassifierConfig;
use crate::core::{ConfigError, DEFAULT_SAMPLE_RATE};
use crate::duplex::FullDuplexConfig;
use crate::manager::ManagerConfig;
use crate::transport::TransportConfig;

fn default_language() -> String {
    "en".to_string()
}

fn default_true() -> bool {
    true
}

fn default_input_sample_rate() -> u32 {
    DEFAULT_SAMPLE_RATE
}

/// Everything a [`VoiceSession`](super::VoiceSession) needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Default language for classification when a signal carries none.
    #[serde(default = "default_language")]
    pub language: String,

    /// Capture sample rate reported to the echo monitor.
    #[serde(default = "default_input_sample_rate")]
    pub input_sample_rate: u32,

    /// Use the echo feedback monitor when one is supplied.
    #[serde(default = "default_true")]
    pub echo_monitoring: bool,

    /// Use the bitrate controller when one is supplied.
    #[serde(default = "default_true")]
    pub adaptive_bitrate: bool,

    /// Handshake and lifecycle settings.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Transport selection.
    #[serde(default)]
    pub manager: ManagerConfig,

    /// Barge-in classifier thresholds.
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Overlap policy.
    #[serde(default)]
    pub duplex: FullDuplexConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            input_sample_rate: default_input_sample_rate(),
            echo_monitoring: true,
            adaptive_bitrate: true,
            transport: TransportConfig::default(),
            manager: ManagerConfig::default(),
            classifier: ClassifierConfig::default(),
            duplex: FullDuplexConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Set the default language.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Set the transport settings.
    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    /// Set the manager settings.
    pub fn with_manager(mut self, manager: ManagerConfig) -> Self {
        self.manager = manager;
        self
    }

    /// Set the overlap policy.
    pub fn with_duplex(mut self, duplex: FullDuplexConfig) -> Self {
        self.duplex = duplex;
        self
    }

    /// Set the classifier thresholds.
    pub fn with_classifier(mut self, classifier: ClassifierConfig) -> Self {
        self.classifier = classifier;
        self
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.language.trim().is_empty() {
            return Err(ConfigError::invalid("language", "must not be empty"));
        }
        if self.input_sample_rate == 0 {
            return Err(ConfigError::invalid("input_sample_rate", "must be positive"));
        }
        self.transport.validate()?;
        self.manager.validate()?;
        self.classifier.validate()?;
        self.duplex.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duplex::OverlapMode;
    use crate::manager::SelectionStrategy;

    #[test]
    fn test_empty_document_is_default() {
        let config = SessionConfig::from_toml_str("").unwrap();
        assert_eq!(config.language, "en");
        assert_eq!(config.manager, ManagerConfig::default());
        assert_eq!(config.duplex, FullDuplexConfig::default());
        assert!(config.echo_monitoring);
    }

    #[test]
    fn test_nested_sections() {
        let config = SessionConfig::from_toml_str(
            r#"
            language = "es"
            adaptive_bitrate = false

            [transport]
            user_id = "u-17"
            heartbeat_interval_ms = 10000

            [transport.reconnect]
            max_attempts = 8

            [manager]
            ws_url = "wss://voice.example.com/session"
            strategy = "websocket_only"

            [classifier]
            hard_barge_min_ms = 600

            [duplex]
            mode = "user_priority"
            duck_volume = 0.2
            "#,
        )
        .unwrap();

        assert_eq!(config.language, "es");
        assert!(!config.adaptive_bitrate);
        assert_eq!(config.transport.user_id, "u-17");
        assert_eq!(config.transport.heartbeat_interval_ms, 10_000);
        assert_eq!(config.transport.reconnect.max_attempts, 8);
        assert_eq!(config.transport.reconnect.base_delay_ms, 1000);
        assert_eq!(config.manager.strategy, SelectionStrategy::WebSocketOnly);
        assert_eq!(config.classifier.hard_barge_min_ms, 600);
        assert_eq!(config.classifier.speech_confirm_ms, 200);
        assert_eq!(config.duplex.mode, OverlapMode::UserPriority);
        assert_eq!(config.duplex.duck_volume, 0.2);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = SessionConfig::from_toml_str("[duplex]\ninterrupt_threshold = 1.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err = SessionConfig::from_toml_str("language = \"\"").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "language", .. }));
    }

    #[test]
    fn test_parse_error() {
        let err = SessionConfig::from_toml_str("[manager\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = SessionConfig::from_file("/nonexistent/voxduplex.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
