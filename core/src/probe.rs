//! Probe gate for the half-open state
//!
//! A semaphore-style permit counter limiting how many calls may probe a
//! recovering dependency at once. A breaker creates a fresh gate every time it
//! enters HalfOpen, so permits left over from an earlier half-open period only
//! ever release their own, stale gate.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Permit counter for concurrent half-open probes
#[derive(Debug)]
pub struct ProbeGate {
    /// Maximum number of probes in flight
    limit: usize,
    /// Probes currently in flight
    acquired: AtomicUsize,
}

impl ProbeGate {
    /// Create a gate admitting up to `limit` probes (at least one)
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            acquired: AtomicUsize::new(0),
        }
    }

    /// Try to take a probe slot without blocking
    ///
    /// Returns `None` when every slot is in use.
    pub fn try_acquire(self: &Arc<Self>) -> Option<ProbePermit> {
        let mut current = self.acquired.load(Ordering::Acquire);

        loop {
            if current >= self.limit {
                return None;
            }

            match self.acquired.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Some(ProbePermit {
                        gate: Arc::clone(self),
                    });
                }
                Err(actual) => current = actual,
            }
        }
    }

    pub fn in_flight(&self) -> usize {
        self.acquired.load(Ordering::Acquire)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn available(&self) -> usize {
        self.limit.saturating_sub(self.in_flight())
    }

    fn release(&self) {
        self.acquired.fetch_sub(1, Ordering::Release);
    }
}

/// An admitted probe; the slot is returned when this is dropped, including
/// when the caller abandons the call mid-flight
#[derive(Debug)]
pub struct ProbePermit {
    gate: Arc<ProbeGate>,
}

impl ProbePermit {
    /// Whether this permit was issued by `gate`
    pub fn belongs_to(&self, gate: &Arc<ProbeGate>) -> bool {
        Arc::ptr_eq(&self.gate, gate)
    }
}

impl Drop for ProbePermit {
    fn drop(&mut self) {
        self.gate.release();
    }
}
