//! Sliding window of recent call outcomes
//!
//! The window is bounded two ways:
//! - by age: records older than the window duration are pruned lazily on access
//! - by count: at most `max_samples` records are kept, oldest evicted first
//!
//! It also keeps a small ring of recent latencies for the average-latency metric.
//! The window has no locking of its own; the owning breaker serializes access.

use crate::{CallOutcome, OutcomeKind};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Capacity of the recent-latency ring buffer
pub const LATENCY_RING_CAPACITY: usize = 100;

/// Outcome counts over the live part of the window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowCounts {
    pub total: usize,
    pub successes: usize,
    pub failures: usize,
    pub timeouts: usize,
}

impl WindowCounts {
    /// Failures plus timeouts
    pub fn unhealthy(&self) -> usize {
        self.failures + self.timeouts
    }
}

/// Time-boxed, size-bounded record of call outcomes
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    window: Duration,
    max_samples: usize,
    /// Completion-ordered, so timestamps are ascending
    records: VecDeque<CallOutcome>,
    recent_latencies: VecDeque<Duration>,
}

impl SlidingWindow {
    pub fn new(window: Duration, max_samples: usize) -> Self {
        Self {
            window,
            max_samples: max_samples.max(1),
            records: VecDeque::new(),
            recent_latencies: VecDeque::with_capacity(LATENCY_RING_CAPACITY),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_samples(&self) -> usize {
        self.max_samples
    }

    /// Append a completed call. Callers record in completion order.
    pub fn record(&mut self, outcome: CallOutcome) {
        if self.recent_latencies.len() == LATENCY_RING_CAPACITY {
            self.recent_latencies.pop_front();
        }
        self.recent_latencies.push_back(outcome.latency);

        self.records.push_back(outcome);
        while self.records.len() > self.max_samples {
            self.records.pop_front();
        }
    }

    /// Drop records that fell out of the window as of `now`
    pub fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.records.front() {
            if now.saturating_duration_since(oldest.timestamp) > self.window {
                self.records.pop_front();
            } else {
                break;
            }
        }
    }

    /// Counts over the stored records. Call `prune` first for an up-to-date view.
    pub fn counts(&self) -> WindowCounts {
        self.records
            .iter()
            .fold(WindowCounts::default(), |mut counts, outcome| {
                counts.total += 1;
                match outcome.kind {
                    OutcomeKind::Success => counts.successes += 1,
                    OutcomeKind::Failure => counts.failures += 1,
                    OutcomeKind::Timeout => counts.timeouts += 1,
                }
                counts
            })
    }

    /// Failure rate over the stored records, or 0.0 while fewer than
    /// `min_volume` samples exist
    pub fn failure_rate(&self, min_volume: usize) -> f64 {
        let counts = self.counts();
        if counts.total == 0 || counts.total < min_volume {
            return 0.0;
        }
        counts.unhealthy() as f64 / counts.total as f64
    }

    /// Mean over the latency ring, zero when nothing has been recorded
    pub fn average_latency(&self) -> Duration {
        if self.recent_latencies.is_empty() {
            return Duration::ZERO;
        }
        let sum: Duration = self.recent_latencies.iter().sum();
        sum / self.recent_latencies.len() as u32
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Last `limit` outcomes, oldest first
    pub fn recent(&self, limit: usize) -> Vec<CallOutcome> {
        let start = self.records.len().saturating_sub(limit);
        self.records.iter().skip(start).cloned().collect()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.recent_latencies.clear();
    }

    #[cfg(test)]
    pub(crate) fn latency_samples(&self) -> usize {
        self.recent_latencies.len()
    }
}
