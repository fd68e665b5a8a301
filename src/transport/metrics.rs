//! Transport metrics and link quality.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::timing::{RttEstimator, quality_score};

/// Link quality derived from heartbeat round trips.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransportQuality {
    /// Latest round-trip time in milliseconds.
    pub rtt_ms: f64,
    /// Smoothed round-trip time in milliseconds.
    pub srtt_ms: f64,
    /// Average throughput since connect, in bits per second.
    pub bandwidth_bps: f64,
    /// 0 - 100, higher is better.
    pub score: u8,
}

impl Default for TransportQuality {
    fn default() -> Self {
        Self {
            rtt_ms: 0.0,
            srtt_ms: 0.0,
            bandwidth_bps: 0.0,
            score: 100,
        }
    }
}

/// Snapshot of transport counters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TransportMetrics {
    /// Bytes written to the link.
    pub bytes_sent: u64,
    /// Bytes read from the link.
    pub bytes_received: u64,
    /// Messages and frames written.
    pub messages_sent: u64,
    /// Messages and frames read.
    pub messages_received: u64,
    /// Reconnection attempts in the current episode.
    pub reconnect_attempts: u32,
    /// Time since the first successful open.
    pub uptime: Duration,
    /// Link quality.
    pub quality: TransportQuality,
}

/// Counter storage owned by one transport.
#[derive(Debug, Default)]
pub(crate) struct MetricsRecorder {
    bytes_sent: u64,
    bytes_received: u64,
    messages_sent: u64,
    messages_received: u64,
    reconnect_attempts: u32,
    connected_since: Option<Instant>,
    rtt: RttEstimator,
}

impl MetricsRecorder {
    /// Forget traffic and timing; called when the caller starts a new
    /// connection. The attempt counter is cleared by [`on_open`](Self::on_open).
    pub(crate) fn reset(&mut self) {
        *self = Self {
            reconnect_attempts: self.reconnect_attempts,
            ..Self::default()
        };
    }

    pub(crate) fn on_open(&mut self) {
        self.connected_since.get_or_insert_with(Instant::now);
        self.reconnect_attempts = 0;
    }

    pub(crate) fn on_reconnect_attempt(&mut self, attempt: u32) {
        self.reconnect_attempts = attempt;
    }

    pub(crate) fn on_sent(&mut self, bytes: usize) {
        self.bytes_sent += bytes as u64;
        self.messages_sent += 1;
    }

    pub(crate) fn on_received(&mut self, bytes: usize) {
        self.bytes_received += bytes as u64;
        self.messages_received += 1;
    }

    pub(crate) fn on_rtt(&mut self, sample: Duration) -> TransportQuality {
        self.rtt.update(sample);
        self.snapshot().quality
    }

    pub(crate) fn snapshot(&self) -> TransportMetrics {
        let uptime = self
            .connected_since
            .map(|since| since.elapsed())
            .unwrap_or_default();
        let secs = uptime.as_secs_f64();
        let bandwidth_bps = if secs > 0.0 {
            (self.bytes_sent + self.bytes_received) as f64 * 8.0 / secs
        } else {
            0.0
        };

        let quality = if self.rtt.is_initialized() {
            TransportQuality {
                rtt_ms: self.rtt.latest_ms(),
                srtt_ms: self.rtt.srtt_ms(),
                bandwidth_bps,
                score: quality_score(self.rtt.latest_ms()),
            }
        } else {
            TransportQuality {
                bandwidth_bps,
                ..Default::default()
            }
        };

        TransportMetrics {
            bytes_sent: self.bytes_sent,
            bytes_received: self.bytes_received,
            messages_sent: self.messages_sent,
            messages_received: self.messages_received,
            reconnect_attempts: self.reconnect_attempts,
            uptime,
            quality,
        }
    }
}
