//! Session errors.

use thiserror::Error;

use crate::core::ConfigError;
use crate::transport::TransportError;

/// Errors raised by [`VoiceSession`](super::VoiceSession).
#[derive(Debug, Error)]
pub enum SessionError {
    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Transport failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl SessionError {
    /// Whether retrying the operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Config(_) => false,
            Self::Transport(e) => e.is_retryable() || matches!(e, TransportError::NotReady(_)),
        }
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ConnectionState;

    #[test]
    fn test_retryable() {
        let err: SessionError = TransportError::NotReady(ConnectionState::Connecting).into();
        assert!(err.is_retryable());

        let err: SessionError = ConfigError::invalid("language", "empty").into();
        assert!(!err.is_retryable());
        assert_eq!(
            err.to_string(),
            "configuration error: invalid value for `language`: empty"
        );
    }
}
