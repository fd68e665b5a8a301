//! Bounded overlap history and statistics.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::core::OVERLAP_HISTORY_CAPACITY;

/// How an overlap ended up being handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapResolution {
    /// The user only acknowledged; AI audio was untouched.
    Backchannel,
    /// AI audio was never changed.
    Continued,
    /// AI audio was ducked at some point.
    Ducked,
    /// AI audio was stopped.
    Interrupted,
}

impl OverlapResolution {
    fn severity(self) -> u8 {
        match self {
            Self::Continued => 0,
            Self::Backchannel => 1,
            Self::Ducked => 2,
            Self::Interrupted => 3,
        }
    }

    /// The more severe of two resolutions.
    pub fn max(self, other: Self) -> Self {
        if other.severity() > self.severity() { other } else { self }
    }
}

/// One finished overlap.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlapEvent {
    /// When both parties started talking.
    pub start_time: Instant,
    /// How long the overlap lasted.
    pub duration: Duration,
    /// VAD confidence when the overlap started.
    pub vad_confidence: f32,
    /// Whether the user's speech was classified as a backchannel.
    pub was_backchannel: bool,
    /// Outcome.
    pub resolution: OverlapResolution,
}

/// Aggregates over the retained history.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OverlapStatistics {
    /// Overlaps in the history.
    pub total_overlaps: u32,
    /// Overlaps flagged as backchannels.
    pub total_backchannels: u32,
    /// Overlaps that ended in an interrupt.
    pub total_interrupts: u32,
    /// Mean overlap duration in milliseconds.
    pub average_overlap_ms: f64,
    /// `total_interrupts / total_overlaps`, or 0 with no overlaps.
    pub interrupt_rate: f64,
}

/// Fixed-capacity ring of overlap events, oldest evicted first.
#[derive(Debug, Clone)]
pub struct OverlapHistory {
    events: VecDeque<OverlapEvent>,
    capacity: usize,
}

impl Default for OverlapHistory {
    fn default() -> Self {
        Self::new(OVERLAP_HISTORY_CAPACITY)
    }
}

impl OverlapHistory {
    /// History holding at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an event, evicting the oldest when full.
    pub fn push(&mut self, event: OverlapEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// Retained events, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &OverlapEvent> {
        self.events.iter()
    }

    /// Most recent event.
    pub fn last(&self) -> Option<&OverlapEvent> {
        self.events.back()
    }

    /// Number of retained events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the history is empty.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Maximum number of retained events.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every event.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Recompute statistics from the retained events.
    pub fn statistics(&self) -> OverlapStatistics {
        let total = self.events.len();
        if total == 0 {
            return OverlapStatistics::default();
        }

        let backchannels = self.events.iter().filter(|e| e.was_backchannel).count();
        let interrupts = self
            .events
            .iter()
            .filter(|e| e.resolution == OverlapResolution::Interrupted)
            .count();
        let total_ms: f64 = self
            .events
            .iter()
            .map(|e| e.duration.as_secs_f64() * 1000.0)
            .sum();

        OverlapStatistics {
            total_overlaps: total as u32,
            total_backchannels: backchannels as u32,
            total_interrupts: interrupts as u32,
            average_overlap_ms: total_ms / total as f64,
            interrupt_rate: interrupts as f64 / total as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(ms: u64, resolution: OverlapResolution) -> OverlapEvent {
        OverlapEvent {
            start_time: Instant::now(),
            duration: Duration::from_millis(ms),
            vad_confidence: 0.5,
            was_backchannel: resolution == OverlapResolution::Backchannel,
            resolution,
        }
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut history = OverlapHistory::default();
        for i in 0..25 {
            history.push(event(i, OverlapResolution::Continued));
        }
        assert_eq!(history.len(), 20);
        assert_eq!(history.iter().next().unwrap().duration, Duration::from_millis(5));
        assert_eq!(history.last().unwrap().duration, Duration::from_millis(24));
    }

    #[test]
    fn test_statistics() {
        let mut history = OverlapHistory::new(10);
        history.push(event(100, OverlapResolution::Interrupted));
        history.push(event(200, OverlapResolution::Backchannel));
        history.push(event(300, OverlapResolution::Ducked));
        history.push(event(400, OverlapResolution::Interrupted));

        let stats = history.statistics();
        assert_eq!(stats.total_overlaps, 4);
        assert_eq!(stats.total_backchannels, 1);
        assert_eq!(stats.total_interrupts, 2);
        assert!((stats.average_overlap_ms - 250.0).abs() < 1e-9);
        assert!((stats.interrupt_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_empty_statistics() {
        let stats = OverlapHistory::default().statistics();
        assert_eq!(stats.total_overlaps, 0);
        assert_eq!(stats.interrupt_rate, 0.0);
    }

    #[test]
    fn test_resolution_severity() {
        use OverlapResolution::*;
        assert_eq!(Continued.max(Ducked), Ducked);
        assert_eq!(Interrupted.max(Ducked), Interrupted);
        assert_eq!(Backchannel.max(Continued), Backchannel);
    }
}
