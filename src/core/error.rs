//! Error types shared across layers.

use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value is outside its allowed range.
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// The TOML document could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Shorthand for [`ConfigError::InvalidValue`].
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

/// Errors raised while loading a phrase table.
#[derive(Debug, Error)]
pub enum PhraseTableError {
    /// The document is not valid JSON or has the wrong shape.
    #[error("malformed phrase table: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The table has no entry for the fallback language.
    #[error("phrase table has no entry for fallback language `{0}`")]
    MissingFallback(String),

    /// The table file could not be read.
    #[error("failed to read phrase table: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level error for the crate.
#[derive(Debug, Error)]
pub enum VoxError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Phrase table error.
    #[error("phrase table error: {0}")]
    PhraseTable(#[from] PhraseTableError),

    /// Transport error.
    #[cfg(feature = "transport")]
    #[error("transport error: {0}")]
    Transport(#[from] crate::transport::TransportError),

    /// Session error.
    #[cfg(feature = "session")]
    #[error("session error: {0}")]
    Session(#[from] crate::session::SessionError),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
