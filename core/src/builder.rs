//! Builder API for ergonomic breaker configuration

use crate::{callbacks::Callbacks, circuit::Breaker, config::BreakerConfig, errors::ConfigError};
use std::sync::Arc;
use std::time::Duration;

/// Builder for creating breakers with a fluent API
pub struct BreakerBuilder {
    name: String,
    config: BreakerConfig,
    callbacks: Callbacks,
}

impl BreakerBuilder {
    /// Create a new builder for a breaker with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: BreakerConfig::default(),
            callbacks: Callbacks::new(),
        }
    }

    /// Start from a complete config (e.g. a preset), then override fields
    pub fn config(mut self, config: BreakerConfig) -> Self {
        self.config = config;
        self
    }

    /// Consecutive failures that open the circuit
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    /// Set the failure rate threshold (0.0-1.0]
    /// Circuit opens when unhealthy / total >= this value
    pub fn failure_rate(mut self, rate: f64) -> Self {
        self.config.failure_rate_threshold = rate;
        self
    }

    /// Set minimum number of samples before either threshold is evaluated
    pub fn min_request_volume(mut self, calls: u32) -> Self {
        self.config.min_request_volume = calls;
        self
    }

    pub fn recovery_timeout(mut self, timeout: Duration) -> Self {
        self.config.recovery_timeout = timeout;
        self
    }

    /// Set the success threshold (probe successes needed to close from half-open)
    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.config.success_threshold = threshold;
        self
    }

    /// Default deadline for each guarded call
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.call_timeout = timeout;
        self
    }

    /// Set the sliding window's age limit and sample cap
    pub fn window(mut self, duration: Duration, max_samples: usize) -> Self {
        self.config.window_duration = duration;
        self.config.max_samples = max_samples;
        self
    }

    pub fn half_open_max_probes(mut self, probes: u32) -> Self {
        self.config.half_open_max_probes = probes;
        self
    }

    /// Set the jitter factor (0.0 = no jitter, 1.0 = full jitter)
    /// Uses chrono-machines formula: timeout * (1 - jitter + rand * jitter)
    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.config.jitter_factor = factor;
        self
    }

    /// Replace all hooks at once
    pub fn callbacks(mut self, callbacks: Callbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Set callback for when the circuit opens
    pub fn on_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_open = Some(Arc::new(f));
        self
    }

    /// Set callback for when the circuit closes
    pub fn on_close<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_close = Some(Arc::new(f));
        self
    }

    /// Set callback for when the circuit enters half-open
    pub fn on_half_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_half_open = Some(Arc::new(f));
        self
    }

    /// Validate the configuration and build the breaker
    pub fn build(self) -> Result<Breaker, ConfigError> {
        self.config.validate()?;
        Ok(Breaker::from_validated(self.name, self.config, self.callbacks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::BreakerState;

    #[test]
    fn test_builder_defaults() {
        let breaker = BreakerBuilder::new("test").build().unwrap();

        assert_eq!(breaker.name(), "test");
        assert_eq!(breaker.state_name(), "closed");
        assert!(breaker.is_closed());
        assert_eq!(breaker.config(), &BreakerConfig::default());
    }

    #[test]
    fn test_builder_custom_config() {
        let breaker = BreakerBuilder::new("test")
            .config(BreakerConfig::cache())
            .failure_threshold(10)
            .window(Duration::from_secs(120), 50)
            .recovery_timeout(Duration::from_secs(45))
            .success_threshold(1)
            .build()
            .unwrap();

        let config = breaker.config();
        assert_eq!(config.failure_threshold, 10);
        assert_eq!(config.window_duration, Duration::from_secs(120));
        assert_eq!(config.max_samples, 50);
        assert_eq!(config.recovery_timeout, Duration::from_secs(45));
        // Untouched preset fields survive
        assert_eq!(config.call_timeout, BreakerConfig::cache().call_timeout);
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let err = BreakerBuilder::new("test")
            .failure_rate(1.5)
            .build()
            .unwrap_err();

        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "failure_rate_threshold",
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_builder_with_callbacks() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let opened = Arc::new(AtomicBool::new(false));
        let opened_clone = opened.clone();

        let breaker = BreakerBuilder::new("test")
            .failure_threshold(2)
            .min_request_volume(2)
            .on_open(move |_name| {
                opened_clone.store(true, Ordering::SeqCst);
            })
            .build()
            .unwrap();

        let _ = breaker.call(|| async { Err::<(), _>("error 1") }).await;
        let _ = breaker.call(|| async { Err::<(), _>("error 2") }).await;

        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(opened.load(Ordering::SeqCst));
    }
}
