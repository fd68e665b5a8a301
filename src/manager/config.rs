//! Transport manager configuration.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::core::{ConfigError, DEFAULT_DEGRADATION_SAMPLES, DEFAULT_QUALITY_THRESHOLD};
use crate::transport::TransportKind;

/// How the manager picks a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Always use the WebSocket; never fall back.
    #[serde(rename = "websocket_only")]
    WebSocketOnly,
    /// Use the datagram link when a peer endpoint is configured.
    PreferDatagram,
    /// Start preferred and switch on live quality.
    #[default]
    Adaptive,
}

fn default_ws_url() -> String {
    "ws://localhost:8080/voice".to_string()
}

fn default_fallback_enabled() -> bool {
    true
}

fn default_quality_threshold() -> u8 {
    DEFAULT_QUALITY_THRESHOLD
}

fn default_degradation_samples() -> u32 {
    DEFAULT_DEGRADATION_SAMPLES
}

/// Configuration for [`TransportManager`](super::TransportManager).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// WebSocket endpoint.
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// Datagram peer endpoint. Datagram links are unavailable without one.
    #[serde(default)]
    pub datagram_peer: Option<SocketAddr>,
    /// Selection strategy.
    #[serde(default)]
    pub strategy: SelectionStrategy,
    /// Switch to the other transport on hard failure.
    #[serde(default = "default_fallback_enabled")]
    pub fallback_enabled: bool,
    /// Quality score below which a sample counts as degraded.
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: u8,
    /// Consecutive degraded samples before an adaptive switch.
    #[serde(default = "default_degradation_samples")]
    pub degradation_samples: u32,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            datagram_peer: None,
            strategy: SelectionStrategy::default(),
            fallback_enabled: default_fallback_enabled(),
            quality_threshold: default_quality_threshold(),
            degradation_samples: default_degradation_samples(),
        }
    }
}

impl ManagerConfig {
    /// Set the WebSocket endpoint.
    pub fn with_ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = url.into();
        self
    }

    /// Set the datagram peer endpoint.
    pub fn with_datagram_peer(mut self, peer: SocketAddr) -> Self {
        self.datagram_peer = Some(peer);
        self
    }

    /// Set the selection strategy.
    pub fn with_strategy(mut self, strategy: SelectionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Enable or disable fallback on hard failure.
    pub fn with_fallback(mut self, enabled: bool) -> Self {
        self.fallback_enabled = enabled;
        self
    }

    /// Set the degradation trigger.
    pub fn with_degradation(mut self, threshold: u8, samples: u32) -> Self {
        self.quality_threshold = threshold;
        self.degradation_samples = samples;
        self
    }

    /// Whether links of `kind` may be used.
    pub fn supports(&self, kind: TransportKind) -> bool {
        match kind {
            TransportKind::WebSocket => true,
            TransportKind::Datagram => {
                self.strategy != SelectionStrategy::WebSocketOnly && self.datagram_peer.is_some()
            }
        }
    }

    /// Kind used for the first connection.
    pub fn preferred_kind(&self) -> TransportKind {
        if self.supports(TransportKind::Datagram) {
            TransportKind::Datagram
        } else {
            TransportKind::WebSocket
        }
    }

    /// Whether sustained low quality triggers a switch.
    pub fn switches_on_quality(&self) -> bool {
        self.strategy == SelectionStrategy::Adaptive
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.ws_url.starts_with("ws://") || self.ws_url.starts_with("wss://")) {
            return Err(ConfigError::invalid(
                "ws_url",
                format!("expected a ws:// or wss:// url, got `{}`", self.ws_url),
            ));
        }
        if self.quality_threshold > 100 {
            return Err(ConfigError::invalid(
                "quality_threshold",
                "must be within [0, 100]",
            ));
        }
        if self.degradation_samples == 0 {
            return Err(ConfigError::invalid(
                "degradation_samples",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}
