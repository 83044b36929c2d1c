//! Per-dependency circuit breaker
//!
//! One lock guards the state machine, the counters and the sliding window. A
//! guarded call takes it twice: once to admit the call and once to record the
//! outcome. The operation itself runs with the lock released.

use crate::{
    CallOutcome, OutcomeKind,
    callbacks::Callbacks,
    config::BreakerConfig,
    errors::{BreakerError, ConfigError, RejectReason},
    probe::{ProbeGate, ProbePermit},
    window::SlidingWindow,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// Externally visible breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters kept for the lifetime of the breaker (until reset)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LifetimeTotals {
    /// Every guarded call, including rejected ones
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub timeouts: u64,
    /// Calls refused without invoking the operation
    pub rejected: u64,
}

/// Point-in-time view of a breaker, for health and status reporting
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: BreakerState,
    pub config: BreakerConfig,
    pub totals: LifetimeTotals,
    pub consecutive_failures: u32,
    /// Windowed failure rate; 0.0 until the window reaches min_request_volume
    pub current_failure_rate: f64,
    #[serde(with = "humantime_serde")]
    pub average_latency: Duration,
    pub window_samples: usize,
    pub last_failure: Option<String>,
    /// Time since the most recent failure or timeout completed
    #[serde(with = "humantime_serde")]
    pub last_failure_ago: Option<Duration>,
    pub is_healthy: bool,
    #[serde(with = "humantime_serde")]
    pub time_until_retry: Duration,
}

/// Data specific to the Open state
#[derive(Debug, Clone)]
struct OpenData {
    opened_at: Instant,
    /// Recovery delay drawn when the circuit opened (jitter applied)
    retry_after: Duration,
}

/// Data specific to the HalfOpen state
#[derive(Debug, Clone)]
struct HalfOpenData {
    consecutive_successes: u32,
    gate: Arc<ProbeGate>,
}

#[derive(Debug, Clone)]
enum Circuit {
    Closed,
    Open(OpenData),
    HalfOpen(HalfOpenData),
}

/// Everything the breaker lock protects
#[derive(Debug)]
struct BreakerCore {
    circuit: Circuit,
    consecutive_failures: u32,
    last_failure: Option<String>,
    last_failure_at: Option<Instant>,
    totals: LifetimeTotals,
    window: SlidingWindow,
}

impl BreakerCore {
    fn new(config: &BreakerConfig) -> Self {
        Self {
            circuit: Circuit::Closed,
            consecutive_failures: 0,
            last_failure: None,
            last_failure_at: None,
            totals: LifetimeTotals::default(),
            window: SlidingWindow::new(config.window_duration, config.max_samples),
        }
    }

    fn state(&self) -> BreakerState {
        match self.circuit {
            Circuit::Closed => BreakerState::Closed,
            Circuit::Open(_) => BreakerState::Open,
            Circuit::HalfOpen(_) => BreakerState::HalfOpen,
        }
    }

    fn failure_rate(&self, config: &BreakerConfig) -> f64 {
        self.window.failure_rate(config.min_request_volume as usize)
    }

    /// Closed -> Open guard: enough volume, then either threshold
    fn should_open(&self, config: &BreakerConfig) -> bool {
        if self.window.len() < config.min_request_volume as usize {
            return false;
        }
        self.consecutive_failures >= config.failure_threshold
            || self.failure_rate(config) >= config.failure_rate_threshold
    }

    fn time_until_retry(&self, now: Instant) -> Duration {
        match &self.circuit {
            Circuit::Open(data) => data
                .retry_after
                .saturating_sub(now.saturating_duration_since(data.opened_at)),
            _ => Duration::ZERO,
        }
    }

    fn trip(&mut self, now: Instant, config: &BreakerConfig) {
        self.circuit = Circuit::Open(OpenData {
            opened_at: now,
            retry_after: recovery_delay(config),
        });
    }

    fn attempt_reset(&mut self, config: &BreakerConfig) {
        self.circuit = Circuit::HalfOpen(HalfOpenData {
            consecutive_successes: 0,
            gate: Arc::new(ProbeGate::new(config.half_open_max_probes as usize)),
        });
    }

    /// HalfOpen -> Closed. Outcomes from before the outage are discarded so
    /// they cannot trip the recovered dependency again.
    fn close(&mut self) {
        self.circuit = Circuit::Closed;
        self.consecutive_failures = 0;
        self.window.clear();
    }

    /// Apply the transitions that depend only on time and window contents
    fn evaluate(
        &mut self,
        now: Instant,
        name: &str,
        config: &BreakerConfig,
        entered: &mut Vec<BreakerState>,
    ) {
        let next = match &self.circuit {
            Circuit::Closed if self.should_open(config) => Some(BreakerState::Open),
            Circuit::Open(data)
                if now.saturating_duration_since(data.opened_at) >= data.retry_after =>
            {
                Some(BreakerState::HalfOpen)
            }
            _ => None,
        };

        match next {
            Some(BreakerState::Open) => {
                warn!(
                    breaker = %name,
                    consecutive_failures = self.consecutive_failures,
                    failure_rate = self.failure_rate(config),
                    samples = self.window.len(),
                    "Circuit breaker opened"
                );
                self.trip(now, config);
                entered.push(BreakerState::Open);
            }
            Some(BreakerState::HalfOpen) => {
                debug!(breaker = %name, "Recovery delay elapsed, circuit breaker half-open");
                self.attempt_reset(config);
                entered.push(BreakerState::HalfOpen);
            }
            _ => {}
        }
    }

    fn rejection<E>(
        &self,
        name: &str,
        reason: RejectReason,
        now: Instant,
        config: &BreakerConfig,
    ) -> BreakerError<E> {
        BreakerError::Open {
            name: name.to_string(),
            reason,
            failure_rate: self.failure_rate(config),
            last_failure: self.last_failure.clone(),
            time_until_retry: self.time_until_retry(now),
        }
    }
}

/// Shortest jittered Open period; policy math is in whole milliseconds
const MIN_JITTERED_DELAY: Duration = Duration::from_millis(1);

/// Recovery delay for a fresh Open period
fn recovery_delay(config: &BreakerConfig) -> Duration {
    if config.jitter_factor > 0.0 {
        let base_ms = config.recovery_timeout.as_millis() as u64;
        let policy = chrono_machines::Policy {
            max_attempts: 1,
            base_delay_ms: base_ms,
            multiplier: 1.0,
            max_delay_ms: base_ms,
        };
        let delay_ms = policy.calculate_delay(1, config.jitter_factor);
        Duration::from_millis(delay_ms as u64).max(MIN_JITTERED_DELAY)
    } else {
        config.recovery_timeout
    }
}

/// Circuit breaker guarding one logical dependency
pub struct Breaker {
    name: String,
    config: BreakerConfig,
    core: Mutex<BreakerCore>,
    callbacks: Callbacks,
}

impl Breaker {
    /// Create a breaker with validated configuration (use builder() for hooks)
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_validated(name.into(), config, Callbacks::new()))
    }

    /// Caller guarantees `config.validate()` passed
    pub(crate) fn from_validated(name: String, config: BreakerConfig, callbacks: Callbacks) -> Self {
        let core = Mutex::new(BreakerCore::new(&config));
        Self {
            name,
            config,
            core,
            callbacks,
        }
    }

    pub fn builder(name: impl Into<String>) -> crate::builder::BreakerBuilder {
        crate::builder::BreakerBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Run `operation` under the breaker with the configured call timeout
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.call_with_timeout(operation, self.config.call_timeout)
            .await
    }

    /// Run `operation` under the breaker with an explicit deadline
    ///
    /// On timeout the operation's future is dropped, so it can never report a
    /// late result. If the caller drops the returned future mid-flight, no
    /// outcome is recorded.
    pub async fn call_with_timeout<F, Fut, T, E>(
        &self,
        operation: F,
        timeout: Duration,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let permit = self.admit()?;
        let started = Instant::now();

        match tokio::time::timeout(timeout, operation()).await {
            Ok(Ok(value)) => {
                let latency = started.elapsed();
                self.complete(|at| CallOutcome::success(at, latency), permit.as_ref());
                Ok(value)
            }
            Ok(Err(e)) => {
                let latency = started.elapsed();
                let description = e.to_string();
                self.complete(
                    |at| CallOutcome::failure(at, latency, description),
                    permit.as_ref(),
                );
                Err(BreakerError::Operation(e))
            }
            Err(_elapsed) => {
                self.complete(|at| CallOutcome::timeout(at, timeout), permit.as_ref());
                Err(BreakerError::Timeout {
                    name: self.name.clone(),
                    timeout,
                })
            }
        }
    }

    /// Pre-check: returns the probe permit when admitted while HalfOpen
    fn admit<E>(&self) -> Result<Option<ProbePermit>, BreakerError<E>> {
        let mut entered = Vec::new();

        let verdict = {
            let mut core = self.core.lock();
            let now = Instant::now();
            core.window.prune(now);
            core.totals.requests += 1;
            core.evaluate(now, &self.name, &self.config, &mut entered);

            let verdict = match &core.circuit {
                Circuit::Closed => Ok(None),
                Circuit::HalfOpen(data) => data
                    .gate
                    .try_acquire()
                    .map(Some)
                    .ok_or(RejectReason::ProbeLimit),
                Circuit::Open(_) => Err(RejectReason::Open),
            };

            verdict.map_err(|reason| {
                core.totals.rejected += 1;
                debug!(breaker = %self.name, %reason, "Call rejected");
                core.rejection(&self.name, reason, now, &self.config)
            })
        };

        self.fire(&entered);
        verdict
    }

    /// Post-update: record the outcome and drive outcome-based transitions
    fn complete(&self, outcome: impl FnOnce(Instant) -> CallOutcome, permit: Option<&ProbePermit>) {
        let mut entered = Vec::new();

        {
            let mut core = self.core.lock();
            let now = Instant::now();
            let outcome = outcome(now);
            let kind = outcome.kind;

            core.window.prune(now);
            // Only probes admitted in the current half-open period move HalfOpen
            let is_probe = match (&core.circuit, permit) {
                (Circuit::HalfOpen(data), Some(permit)) => permit.belongs_to(&data.gate),
                _ => false,
            };

            trace!(
                breaker = %self.name,
                outcome = ?kind,
                latency_ms = outcome.latency.as_millis() as u64,
                probe = is_probe,
                "Call completed"
            );

            if kind.is_failure() {
                if kind == OutcomeKind::Timeout {
                    core.totals.timeouts += 1;
                } else {
                    core.totals.failures += 1;
                }
                core.consecutive_failures = core.consecutive_failures.saturating_add(1);
                core.last_failure = outcome.error.clone();
                core.last_failure_at = Some(now);
            } else {
                core.totals.successes += 1;
                core.consecutive_failures = 0;
            }
            core.window.record(outcome);

            if is_probe {
                if kind.is_failure() {
                    warn!(breaker = %self.name, "Probe failed, reopening circuit breaker");
                    core.trip(now, &self.config);
                    entered.push(BreakerState::Open);
                } else {
                    let ready = match &mut core.circuit {
                        Circuit::HalfOpen(data) => {
                            data.consecutive_successes += 1;
                            data.consecutive_successes >= self.config.success_threshold
                        }
                        _ => false,
                    };
                    if ready {
                        info!(breaker = %self.name, "Circuit breaker closed");
                        core.close();
                        entered.push(BreakerState::Closed);
                    }
                }
            }

            core.evaluate(now, &self.name, &self.config, &mut entered);
        }

        self.fire(&entered);
    }

    fn fire(&self, entered: &[BreakerState]) {
        for state in entered {
            self.callbacks.trigger(&self.name, *state);
        }
    }

    /// Consistent view of state and statistics; never transitions
    pub fn snapshot(&self) -> BreakerSnapshot {
        let mut core = self.core.lock();
        let now = Instant::now();
        core.window.prune(now);

        let state = core.state();
        BreakerSnapshot {
            name: self.name.clone(),
            state,
            config: self.config.clone(),
            totals: core.totals,
            consecutive_failures: core.consecutive_failures,
            current_failure_rate: core.failure_rate(&self.config),
            average_latency: core.window.average_latency(),
            window_samples: core.window.len(),
            last_failure: core.last_failure.clone(),
            last_failure_ago: core
                .last_failure_at
                .map(|at| now.saturating_duration_since(at)),
            is_healthy: state == BreakerState::Closed,
            time_until_retry: core.time_until_retry(now),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.core.lock().state()
    }

    pub fn state_name(&self) -> &'static str {
        self.state().as_str()
    }

    pub fn is_open(&self) -> bool {
        self.state() == BreakerState::Open
    }

    pub fn is_closed(&self) -> bool {
        self.state() == BreakerState::Closed
    }

    pub fn is_half_open(&self) -> bool {
        self.state() == BreakerState::HalfOpen
    }

    pub fn totals(&self) -> LifetimeTotals {
        self.core.lock().totals
    }

    /// When the most recent failure or timeout completed
    pub fn last_failure_at(&self) -> Option<Instant> {
        self.core.lock().last_failure_at
    }

    /// Last `limit` outcomes still in the window, oldest first
    pub fn recent_outcomes(&self, limit: usize) -> Vec<CallOutcome> {
        let mut core = self.core.lock();
        core.window.prune(Instant::now());
        core.window.recent(limit)
    }

    /// Back to Closed with zeroed counters and an empty window
    pub fn reset(&self) {
        let previous = {
            let mut core = self.core.lock();
            let previous = core.state();
            *core = BreakerCore::new(&self.config);
            previous
        };

        debug!(breaker = %self.name, from = %previous, "Circuit breaker reset");
        if previous != BreakerState::Closed {
            self.callbacks.trigger(&self.name, BreakerState::Closed);
        }
    }

    /// Open the circuit now, regardless of statistics
    pub fn force_open(&self) {
        let previous = {
            let mut core = self.core.lock();
            let previous = core.state();
            core.trip(Instant::now(), &self.config);
            previous
        };

        warn!(breaker = %self.name, from = %previous, "Circuit breaker forced open");
        if previous != BreakerState::Open {
            self.callbacks.trigger(&self.name, BreakerState::Open);
        }
    }
}

impl fmt::Debug for Breaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Breaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("config", &self.config)
            .field("callbacks", &self.callbacks)
            .finish()
    }
}
