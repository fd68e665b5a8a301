//! Transport configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::message::SessionInit;
use super::timing::ReconnectPolicy;
use crate::core::{CONNECT_TIMEOUT, ConfigError, HEARTBEAT_INTERVAL, HEARTBEAT_TIMEOUT};

fn default_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_user_id() -> String {
    "anonymous".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    CONNECT_TIMEOUT.as_millis() as u64
}

fn default_heartbeat_interval_ms() -> u64 {
    HEARTBEAT_INTERVAL.as_millis() as u64
}

fn default_heartbeat_timeout_ms() -> u64 {
    HEARTBEAT_TIMEOUT.as_millis() as u64
}

fn default_true() -> bool {
    true
}

/// Lifecycle and handshake settings shared by every link type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Session identifier sent in `session.init`.
    #[serde(default = "default_session_id")]
    pub session_id: String,

    /// User identifier sent in `session.init`.
    #[serde(default = "default_user_id")]
    pub user_id: String,

    /// Conversation to resume.
    #[serde(default)]
    pub conversation_id: Option<String>,

    /// Features announced in `session.init`.
    #[serde(default)]
    pub features: Vec<String>,

    /// Time allowed for the link to open.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Ping interval once ready.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Time allowed for a pong.
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,

    /// Retry automatically after unexpected failures.
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,

    /// Backoff schedule.
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            session_id: default_session_id(),
            user_id: default_user_id(),
            conversation_id: None,
            features: Vec::new(),
            connect_timeout_ms: default_connect_timeout_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            auto_reconnect: true,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl TransportConfig {
    /// Start building a configuration.
    pub fn builder() -> TransportConfigBuilder {
        TransportConfigBuilder::new()
    }

    /// Connect timeout as a duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Heartbeat interval as a duration.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Heartbeat timeout as a duration.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    /// The handshake this configuration produces.
    pub fn session_init(&self) -> SessionInit {
        SessionInit {
            features: self.features.clone(),
            conversation_id: self.conversation_id.clone(),
            ..SessionInit::new(&self.session_id, &self.user_id)
        }
    }

    /// Reject zero timeouts and an interval not longer than the timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::invalid("connect_timeout_ms", "must be positive"));
        }
        if self.heartbeat_timeout_ms == 0 {
            return Err(ConfigError::invalid("heartbeat_timeout_ms", "must be positive"));
        }
        if self.heartbeat_interval_ms <= self.heartbeat_timeout_ms {
            return Err(ConfigError::invalid(
                "heartbeat_interval_ms",
                "must be greater than heartbeat_timeout_ms",
            ));
        }
        if self.reconnect.base_delay_ms == 0 {
            return Err(ConfigError::invalid("reconnect.base_delay_ms", "must be positive"));
        }
        Ok(())
    }
}

/// Builder for [`TransportConfig`].
#[derive(Debug, Default)]
pub struct TransportConfigBuilder {
    config: TransportConfig,
}

impl TransportConfigBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the session id.
    pub fn session_id(mut self, id: impl Into<String>) -> Self {
        self.config.session_id = id.into();
        self
    }

    /// Set the user id.
    pub fn user_id(mut self, id: impl Into<String>) -> Self {
        self.config.user_id = id.into();
        self
    }

    /// Set the conversation to resume.
    pub fn conversation_id(mut self, id: impl Into<String>) -> Self {
        self.config.conversation_id = Some(id.into());
        self
    }

    /// Announce a feature.
    pub fn feature(mut self, feature: impl Into<String>) -> Self {
        self.config.features.push(feature.into());
        self
    }

    /// Set the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the heartbeat interval and timeout.
    pub fn heartbeat(mut self, interval: Duration, timeout: Duration) -> Self {
        self.config.heartbeat_interval_ms = interval.as_millis() as u64;
        self.config.heartbeat_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Enable or disable automatic reconnection.
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.config.auto_reconnect = enabled;
        self
    }

    /// Set the backoff schedule.
    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.config.reconnect = policy;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> TransportConfig {
        self.config
    }
}
