//! RTT estimation, heartbeat timing and reconnection backoff.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::core::{MAX_RECONNECT_ATTEMPTS, RECONNECT_BASE_DELAY, RECONNECT_MAX_DELAY};

/// Smoothing constants (RFC 6298).
pub mod constants {
    /// Alpha for SRTT smoothing (0.125 = 1/8).
    pub const SRTT_ALPHA: f64 = 0.125;

    /// Beta for RTTVAR smoothing (0.25 = 1/4).
    pub const RTTVAR_BETA: f64 = 0.25;
}

/// Smoothed RTT tracker.
///
/// The quality score is driven by the latest sample; the smoothed values are
/// kept for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct RttEstimator {
    /// Smoothed RTT in milliseconds.
    srtt: f64,
    /// RTT variance in milliseconds.
    rttvar: f64,
    /// Most recent sample in milliseconds.
    latest: f64,
    samples: u64,
}

impl RttEstimator {
    /// Create an estimator with no samples.
    pub fn new() -> Self {
        Self::default()
    }

    /// Update with a new sample.
    ///
    /// - First measurement: SRTT = sample, RTTVAR = sample / 2
    /// - Subsequent: RTTVAR = 0.75 * RTTVAR + 0.25 * |SRTT - sample|
    /// - SRTT = 0.875 * SRTT + 0.125 * sample
    pub fn update(&mut self, sample: Duration) {
        let sample_ms = sample.as_secs_f64() * 1000.0;

        if self.samples == 0 {
            self.srtt = sample_ms;
            self.rttvar = sample_ms / 2.0;
        } else {
            self.rttvar = (1.0 - constants::RTTVAR_BETA) * self.rttvar
                + constants::RTTVAR_BETA * (self.srtt - sample_ms).abs();
            self.srtt =
                (1.0 - constants::SRTT_ALPHA) * self.srtt + constants::SRTT_ALPHA * sample_ms;
        }

        self.latest = sample_ms;
        self.samples += 1;
    }

    /// Latest sample in milliseconds.
    pub fn latest_ms(&self) -> f64 {
        self.latest
    }

    /// Smoothed RTT in milliseconds.
    pub fn srtt_ms(&self) -> f64 {
        self.srtt
    }

    /// RTT variance in milliseconds.
    pub fn rttvar_ms(&self) -> f64 {
        self.rttvar
    }

    /// Number of samples seen.
    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Whether at least one sample arrived.
    pub fn is_initialized(&self) -> bool {
        self.samples > 0
    }
}

/// Quality score for a round-trip time.
///
/// | RTT (ms) | score |
/// |----------|-------|
/// | ≤ 50     | 100   |
/// | ≤ 100    | 90    |
/// | ≤ 200    | 70    |
/// | ≤ 500    | 50    |
/// | > 500    | 30    |
pub fn quality_score(rtt_ms: f64) -> u8 {
    match rtt_ms {
        r if r <= 50.0 => 100,
        r if r <= 100.0 => 90,
        r if r <= 200.0 => 70,
        r if r <= 500.0 => 50,
        _ => 30,
    }
}

/// Tracks the outstanding heartbeat ping.
///
/// Timestamps are milliseconds since the tracker was created, echoed back by
/// the peer in its pong.
#[derive(Debug, Clone)]
pub struct PingTracker {
    start: Instant,
    pending: Option<(u64, Instant)>,
}

impl Default for PingTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PingTracker {
    /// Create a tracker anchored at now.
    pub fn new() -> Self {
        Self::with_start(Instant::now())
    }

    /// Create a tracker with a specific start time.
    pub fn with_start(start: Instant) -> Self {
        Self {
            start,
            pending: None,
        }
    }

    /// Current timestamp.
    pub fn now(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Record an outgoing ping and return its timestamp.
    ///
    /// A ping that was never answered is replaced.
    pub fn on_ping(&mut self) -> u64 {
        let timestamp = self.now();
        self.pending = Some((timestamp, Instant::now()));
        timestamp
    }

    /// Process a pong. Returns an RTT sample if it answers the pending ping.
    pub fn on_pong(&mut self, timestamp: u64) -> Option<Duration> {
        match self.pending {
            Some((pending, sent)) if pending == timestamp => {
                self.pending = None;
                Some(sent.elapsed())
            }
            _ => None,
        }
    }

    /// When the pending ping was sent.
    pub fn pending_since(&self) -> Option<Instant> {
        self.pending.map(|(_, sent)| sent)
    }

    /// Whether the pending ping has waited longer than `timeout`.
    pub fn is_overdue(&self, timeout: Duration) -> bool {
        self.pending_since()
            .is_some_and(|sent| sent.elapsed() >= timeout)
    }

    /// Forget the pending ping.
    pub fn clear(&mut self) {
        self.pending = None;
    }
}

fn default_base_delay_ms() -> u64 {
    RECONNECT_BASE_DELAY.as_millis() as u64
}

fn default_max_delay_ms() -> u64 {
    RECONNECT_MAX_DELAY.as_millis() as u64
}

fn default_max_attempts() -> u32 {
    MAX_RECONNECT_ATTEMPTS
}

/// Exponential reconnection backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Delay before the first retry.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound on any delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Retries before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before attempt `attempt` (1-based):
    /// `min(base * 2^(attempt - 1), max)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    /// Whether attempt `attempt` (1-based) is allowed.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }
}
