//! Registry mapping logical dependency names to breakers
//!
//! Breakers are created lazily on first use, from the preset registered for
//! the name or from the registry default. Concurrent first access for the same
//! name yields a single shared breaker.

use crate::{
    callbacks::Callbacks,
    circuit::{Breaker, BreakerSnapshot},
    config::{BreakerConfig, RegistryConfig},
    errors::{BreakerError, ConfigError},
};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Fleet-wide health derived from every breaker's snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSummary {
    pub total_services: usize,
    pub healthy_count: usize,
    pub unhealthy_count: usize,
    pub healthy_names: Vec<String>,
    pub unhealthy_names: Vec<String>,
    /// 100.0 when no breakers exist
    pub healthy_percentage: f64,
}

impl HealthSummary {
    fn from_states(states: &BTreeMap<String, BreakerSnapshot>) -> Self {
        let (healthy, unhealthy): (Vec<_>, Vec<_>) =
            states.values().partition(|snapshot| snapshot.is_healthy);

        let total_services = states.len();
        let healthy_percentage = if total_services == 0 {
            100.0
        } else {
            healthy.len() as f64 * 100.0 / total_services as f64
        };

        Self {
            total_services,
            healthy_count: healthy.len(),
            unhealthy_count: unhealthy.len(),
            healthy_names: healthy.iter().map(|s| s.name.clone()).collect(),
            unhealthy_names: unhealthy.iter().map(|s| s.name.clone()).collect(),
            healthy_percentage,
        }
    }

    pub fn all_healthy(&self) -> bool {
        self.unhealthy_count == 0
    }
}

/// Name -> breaker map shared by every caller in the process
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<Breaker>>,
    config: RegistryConfig,
    /// Installed on every breaker the registry creates
    callbacks: Callbacks,
}

impl BreakerRegistry {
    /// Create a registry, validating the default config and every preset
    pub fn new(config: RegistryConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_validated(config, Callbacks::new()))
    }

    fn from_validated(config: RegistryConfig, callbacks: Callbacks) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
            callbacks,
        }
    }

    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Breaker for `name`, created on first access
    pub fn get_or_create(&self, name: &str) -> Arc<Breaker> {
        if let Some(breaker) = self.breakers.get(name) {
            return Arc::clone(breaker.value());
        }

        let entry = self.breakers.entry(name.to_string()).or_insert_with(|| {
            let config = self.config.config_for(name).clone();
            debug!(
                breaker = %name,
                preset = self.config.presets.contains_key(name),
                "Creating circuit breaker"
            );
            Arc::new(Breaker::from_validated(
                name.to_string(),
                config,
                self.callbacks.clone(),
            ))
        });
        Arc::clone(entry.value())
    }

    /// Breaker for `name` if one has been created
    pub fn get(&self, name: &str) -> Option<Arc<Breaker>> {
        self.breakers.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Run `operation` through the breaker for `name`
    pub async fn execute<F, Fut, T, E>(&self, name: &str, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let breaker = self.get_or_create(name);
        breaker.call(operation).await
    }

    /// Like [`execute`](Self::execute) with an explicit deadline
    pub async fn execute_with_timeout<F, Fut, T, E>(
        &self,
        name: &str,
        operation: F,
        timeout: Duration,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let breaker = self.get_or_create(name);
        breaker.call_with_timeout(operation, timeout).await
    }

    fn breakers(&self) -> Vec<Arc<Breaker>> {
        self.breakers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Snapshot of every breaker, keyed by name
    ///
    /// Each breaker is captured independently; there is no cross-breaker
    /// consistency.
    pub fn all_states(&self) -> BTreeMap<String, BreakerSnapshot> {
        self.breakers()
            .into_iter()
            .map(|breaker| (breaker.name().to_string(), breaker.snapshot()))
            .collect()
    }

    pub fn health_summary(&self) -> HealthSummary {
        HealthSummary::from_states(&self.all_states())
    }

    pub fn reset_all(&self) {
        let breakers = self.breakers();
        for breaker in &breakers {
            breaker.reset();
        }
        info!(count = breakers.len(), "Reset all circuit breakers");
    }

    /// Returns false when no breaker exists for `name`
    pub fn reset_one(&self, name: &str) -> bool {
        match self.get(name) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    /// Force the named breaker open; returns false when it does not exist
    pub fn force_open(&self, name: &str) -> bool {
        match self.get(name) {
            Some(breaker) => {
                breaker.force_open();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Names of all created breakers, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl Default for BreakerRegistry {
    /// Default breaker config plus the standard presets
    fn default() -> Self {
        Self::from_validated(RegistryConfig::default(), Callbacks::new())
    }
}

impl fmt::Debug for BreakerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreakerRegistry")
            .field("breakers", &self.names())
            .field("config", &self.config)
            .field("callbacks", &self.callbacks)
            .finish()
    }
}

/// Fluent construction for [`BreakerRegistry`]
pub struct RegistryBuilder {
    config: RegistryConfig,
    callbacks: Callbacks,
}

impl RegistryBuilder {
    /// Starts with the default config and the standard presets
    pub fn new() -> Self {
        Self {
            config: RegistryConfig::default(),
            callbacks: Callbacks::new(),
        }
    }

    /// Replace the whole registry configuration
    pub fn config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    /// Config for dependencies without a preset
    pub fn default_config(mut self, config: BreakerConfig) -> Self {
        self.config.default = config;
        self
    }

    /// Register or override the preset for `name`
    pub fn preset(mut self, name: impl Into<String>, config: BreakerConfig) -> Self {
        self.config.presets.insert(name.into(), config);
        self
    }

    pub fn without_standard_presets(mut self) -> Self {
        self.config.presets.clear();
        self
    }

    pub fn on_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_open = Some(Arc::new(f));
        self
    }

    pub fn on_close<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_close = Some(Arc::new(f));
        self
    }

    pub fn on_half_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_half_open = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> Result<BreakerRegistry, ConfigError> {
        self.config.validate()?;
        Ok(BreakerRegistry::from_validated(self.config, self.callbacks))
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
