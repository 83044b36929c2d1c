//! Breaker and registry configuration
//!
//! Both structs deserialize from any serde format with `#[serde(default)]`, and
//! durations use humantime strings (`"30s"`, `"250ms"`). Loading the file is the
//! embedding application's job; this module only validates values.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Preset name for slow, flaky third-party HTTP APIs
pub const EXTERNAL_API_PRESET: &str = "external_api";
/// Preset name for the primary database
pub const DATABASE_PRESET: &str = "database";
/// Preset name for the cache tier
pub const CACHE_PRESET: &str = "cache";

/// Per-breaker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures (or timeouts) that trip the circuit
    pub failure_threshold: u32,

    /// Windowed failure rate (0.0-1.0] that trips the circuit
    pub failure_rate_threshold: f64,

    /// Time spent Open before a probe is allowed
    #[serde(with = "humantime_serde")]
    pub recovery_timeout: Duration,

    /// Samples the window must hold before either threshold is evaluated
    pub min_request_volume: u32,

    /// Probe successes needed in HalfOpen to close the circuit
    pub success_threshold: u32,

    /// Default deadline for a guarded call
    #[serde(with = "humantime_serde")]
    pub call_timeout: Duration,

    /// Age limit for outcomes in the sliding window
    #[serde(with = "humantime_serde")]
    pub window_duration: Duration,

    /// Hard cap on outcomes kept in the sliding window
    pub max_samples: usize,

    /// Probes allowed in flight at once while HalfOpen
    pub half_open_max_probes: u32,

    /// Jitter factor for recovery_timeout (0.0 = none, 1.0 = full)
    /// Uses chrono-machines formula: timeout * (1 - jitter + rand * jitter)
    pub jitter_factor: f64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_rate_threshold: 0.5,
            recovery_timeout: Duration::from_secs(60),
            min_request_volume: 10,
            success_threshold: 3,
            call_timeout: Duration::from_secs(30),
            window_duration: Duration::from_secs(60),
            max_samples: 1000,
            half_open_max_probes: 1,
            jitter_factor: 0.0,
        }
    }
}

impl BreakerConfig {
    /// Third-party HTTP APIs: slow and flaky, so trip on little evidence and
    /// give each call a long deadline
    pub fn external_api() -> Self {
        Self {
            failure_threshold: 3,
            failure_rate_threshold: 0.5,
            recovery_timeout: Duration::from_secs(120),
            min_request_volume: 3,
            success_threshold: 2,
            call_timeout: Duration::from_secs(60),
            window_duration: Duration::from_secs(300),
            ..Self::default()
        }
    }

    /// Primary database: fast and critical, so demand volume before tripping,
    /// fail calls quickly and probe again soon
    pub fn database() -> Self {
        Self {
            failure_threshold: 10,
            failure_rate_threshold: 0.5,
            recovery_timeout: Duration::from_secs(15),
            min_request_volume: 20,
            success_threshold: 3,
            call_timeout: Duration::from_secs(5),
            window_duration: Duration::from_secs(60),
            ..Self::default()
        }
    }

    pub fn cache() -> Self {
        Self {
            failure_threshold: 5,
            failure_rate_threshold: 0.6,
            recovery_timeout: Duration::from_secs(10),
            min_request_volume: 10,
            success_threshold: 2,
            call_timeout: Duration::from_secs(2),
            window_duration: Duration::from_secs(30),
            ..Self::default()
        }
    }

    /// Check every field against its allowed range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::invalid(
                "failure_threshold",
                "at least 1",
                self.failure_threshold,
            ));
        }
        if !(self.failure_rate_threshold > 0.0 && self.failure_rate_threshold <= 1.0) {
            return Err(ConfigError::invalid(
                "failure_rate_threshold",
                "in (0, 1]",
                self.failure_rate_threshold,
            ));
        }
        if self.recovery_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "recovery_timeout",
                "greater than zero",
                format!("{:?}", self.recovery_timeout),
            ));
        }
        if self.min_request_volume == 0 {
            return Err(ConfigError::invalid(
                "min_request_volume",
                "at least 1",
                self.min_request_volume,
            ));
        }
        if self.success_threshold == 0 {
            return Err(ConfigError::invalid(
                "success_threshold",
                "at least 1",
                self.success_threshold,
            ));
        }
        if self.call_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "call_timeout",
                "greater than zero",
                format!("{:?}", self.call_timeout),
            ));
        }
        if self.window_duration.is_zero() {
            return Err(ConfigError::invalid(
                "window_duration",
                "greater than zero",
                format!("{:?}", self.window_duration),
            ));
        }
        if self.max_samples == 0 {
            return Err(ConfigError::invalid(
                "max_samples",
                "at least 1",
                self.max_samples,
            ));
        }
        // A smaller cap would keep the window below the volume gate forever
        if self.max_samples < self.min_request_volume as usize {
            return Err(ConfigError::invalid(
                "max_samples",
                "at least min_request_volume",
                self.max_samples,
            ));
        }
        if self.half_open_max_probes == 0 {
            return Err(ConfigError::invalid(
                "half_open_max_probes",
                "at least 1",
                self.half_open_max_probes,
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ConfigError::invalid(
                "jitter_factor",
                "in [0, 1]",
                self.jitter_factor,
            ));
        }
        Ok(())
    }
}

/// Registry configuration: the fallback config plus named presets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Used for any dependency without a preset
    pub default: BreakerConfig,
    /// Keyed by logical dependency name
    pub presets: HashMap<String, BreakerConfig>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default: BreakerConfig::default(),
            presets: standard_presets(),
        }
    }
}

impl RegistryConfig {
    /// Default config and no presets
    pub fn empty() -> Self {
        Self {
            default: BreakerConfig::default(),
            presets: HashMap::new(),
        }
    }

    /// Config a breaker named `name` would be created with
    pub fn config_for(&self, name: &str) -> &BreakerConfig {
        self.presets.get(name).unwrap_or(&self.default)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.default.validate()?;
        for (name, preset) in &self.presets {
            preset.validate().map_err(|e| ConfigError::Preset {
                name: name.clone(),
                source: Box::new(e),
            })?;
        }
        Ok(())
    }
}

/// Built-in presets for the dependencies every deployment has
pub fn standard_presets() -> HashMap<String, BreakerConfig> {
    HashMap::from([
        (EXTERNAL_API_PRESET.to_string(), BreakerConfig::external_api()),
        (DATABASE_PRESET.to_string(), BreakerConfig::database()),
        (CACHE_PRESET.to_string(), BreakerConfig::cache()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builtin_configs_are_valid() {
        assert!(BreakerConfig::default().validate().is_ok());
        assert!(RegistryConfig::default().validate().is_ok());
        assert!(RegistryConfig::empty().validate().is_ok());
    }

    #[test]
    fn test_presets_follow_dependency_profiles() {
        let api = BreakerConfig::external_api();
        let db = BreakerConfig::database();

        assert!(api.min_request_volume < db.min_request_volume);
        assert!(api.call_timeout > db.call_timeout);
        assert!(db.recovery_timeout < api.recovery_timeout);
    }

    #[test]
    fn test_rejects_out_of_range_rate() {
        for rate in [0.0, -0.1, 1.01, f64::NAN] {
            let config = BreakerConfig {
                failure_rate_threshold: rate,
                ..Default::default()
            };
            match config.validate() {
                Err(ConfigError::Invalid { field, .. }) => {
                    assert_eq!(field, "failure_rate_threshold")
                }
                other => panic!("rate {rate} should be rejected, got {other:?}"),
            }
        }

        let config = BreakerConfig {
            failure_rate_threshold: 1.0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_counts_and_durations() {
        let cases = [
            (
                "failure_threshold",
                BreakerConfig {
                    failure_threshold: 0,
                    ..Default::default()
                },
            ),
            (
                "recovery_timeout",
                BreakerConfig {
                    recovery_timeout: Duration::ZERO,
                    ..Default::default()
                },
            ),
            (
                "min_request_volume",
                BreakerConfig {
                    min_request_volume: 0,
                    ..Default::default()
                },
            ),
            (
                "success_threshold",
                BreakerConfig {
                    success_threshold: 0,
                    ..Default::default()
                },
            ),
            (
                "call_timeout",
                BreakerConfig {
                    call_timeout: Duration::ZERO,
                    ..Default::default()
                },
            ),
            (
                "window_duration",
                BreakerConfig {
                    window_duration: Duration::ZERO,
                    ..Default::default()
                },
            ),
            (
                "max_samples",
                BreakerConfig {
                    max_samples: 0,
                    ..Default::default()
                },
            ),
            (
                "half_open_max_probes",
                BreakerConfig {
                    half_open_max_probes: 0,
                    ..Default::default()
                },
            ),
            (
                "jitter_factor",
                BreakerConfig {
                    jitter_factor: 1.5,
                    ..Default::default()
                },
            ),
        ];

        for (expected, config) in cases {
            match config.validate() {
                Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, expected),
                other => panic!("{expected}: expected Invalid, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_sample_cap_must_cover_request_volume() {
        let config = BreakerConfig {
            min_request_volume: 10,
            max_samples: 5,
            ..Default::default()
        };
        match config.validate() {
            Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, "max_samples"),
            other => panic!("expected max_samples rejection, got {other:?}"),
        }

        let boundary = BreakerConfig {
            min_request_volume: 10,
            max_samples: 10,
            ..Default::default()
        };
        assert!(boundary.validate().is_ok());
    }

    #[test]
    fn test_invalid_preset_is_named() {
        let mut config = RegistryConfig::empty();
        config.presets.insert(
            "scraper".to_string(),
            BreakerConfig {
                success_threshold: 0,
                ..Default::default()
            },
        );

        match config.validate() {
            Err(ConfigError::Preset { name, .. }) => assert_eq!(name, "scraper"),
            other => panic!("expected Preset error, got {other:?}"),
        }
    }

    #[test]
    fn test_deserialize_with_humantime_and_defaults() {
        let json = r#"{
            "default": { "call_timeout": "750ms", "failure_threshold": 4 },
            "presets": {
                "payments": { "recovery_timeout": "2m", "min_request_volume": 2 }
            }
        }"#;

        let config: RegistryConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.default.call_timeout, Duration::from_millis(750));
        assert_eq!(config.default.failure_threshold, 4);
        assert_eq!(config.default.min_request_volume, 10);

        let payments = config.config_for("payments");
        assert_eq!(payments.recovery_timeout, Duration::from_secs(120));
        assert_eq!(payments.min_request_volume, 2);
        assert_eq!(payments.call_timeout, Duration::from_secs(30));

        assert_eq!(config.config_for("unknown"), &config.default);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_serialize_round_trip() {
        let config = BreakerConfig::database();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"call_timeout\":\"5s\""));

        let back: BreakerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
