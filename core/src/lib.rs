//! breaker-fleet - circuit breakers for unreliable downstream dependencies
//!
//! This crate provides:
//! - A sliding window of recent call outcomes, bounded both by age and by sample count
//! - A per-dependency breaker state machine (Closed → Open → HalfOpen) with guarded async calls
//! - Per-call deadlines; timed-out operations are dropped and counted as failures
//! - A registry that lazily creates one breaker per dependency name from presets
//!   and reports fleet-wide health
//!
//! # Example
//!
//! ```rust,no_run
//! use breaker_fleet::{BreakerError, BreakerRegistry};
//! use std::sync::Arc;
//!
//! # async fn lookup_profile(_id: u64) -> Result<String, std::io::Error> { Ok(String::new()) }
//! # async fn run() {
//! let registry = Arc::new(BreakerRegistry::default());
//!
//! match registry.execute("database", || lookup_profile(42)).await {
//!     Ok(profile) => println!("loaded {profile}"),
//!     Err(BreakerError::Open { time_until_retry, .. }) => {
//!         println!("database circuit open, retry in {time_until_retry:?}")
//!     }
//!     Err(e) => println!("call failed: {e}"),
//! }
//!
//! let summary = registry.health_summary();
//! println!("{}% of dependencies healthy", summary.healthy_percentage);
//! # }
//! ```

pub mod builder;
pub mod callbacks;
pub mod circuit;
pub mod config;
pub mod errors;
pub mod probe;
pub mod registry;
pub mod window;

pub use builder::BreakerBuilder;
pub use callbacks::Callbacks;
pub use circuit::{Breaker, BreakerSnapshot, BreakerState, LifetimeTotals};
pub use config::{BreakerConfig, RegistryConfig};
pub use errors::{BreakerError, ConfigError, RejectReason};
pub use probe::{ProbeGate, ProbePermit};
pub use registry::{BreakerRegistry, HealthSummary, RegistryBuilder};
pub use window::{SlidingWindow, WindowCounts};

use std::time::Duration;
use tokio::time::Instant;

/// Outcome kind for a guarded call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Success,
    Failure,
    Timeout,
}

impl OutcomeKind {
    /// Failures and timeouts both count against the dependency
    pub fn is_failure(self) -> bool {
        !matches!(self, OutcomeKind::Success)
    }
}

/// A single completed call recorded by a breaker
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub kind: OutcomeKind,
    /// Completion time
    pub timestamp: Instant,
    pub latency: Duration,
    pub error: Option<String>,
}

impl CallOutcome {
    pub fn success(timestamp: Instant, latency: Duration) -> Self {
        Self {
            kind: OutcomeKind::Success,
            timestamp,
            latency,
            error: None,
        }
    }

    pub fn failure(timestamp: Instant, latency: Duration, error: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::Failure,
            timestamp,
            latency,
            error: Some(error.into()),
        }
    }

    pub fn timeout(timestamp: Instant, deadline: Duration) -> Self {
        Self {
            kind: OutcomeKind::Timeout,
            timestamp,
            latency: deadline,
            error: Some(format!("operation exceeded deadline of {deadline:?}")),
        }
    }
}
