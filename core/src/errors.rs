//! Error types for breaker operations and configuration

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Why a call was rejected without being attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Circuit is open and the recovery delay has not elapsed
    Open,
    /// Circuit is half-open and every probe slot is taken
    ProbeLimit,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Open => f.write_str("open"),
            RejectReason::ProbeLimit => f.write_str("half-open with all probe slots in use"),
        }
    }
}

/// Errors returned from a guarded call
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// Rejected without invoking the operation
    #[error(
        "circuit '{name}' is {reason} (failure rate {failure_rate:.2}, retry in {time_until_retry:?})"
    )]
    Open {
        name: String,
        reason: RejectReason,
        failure_rate: f64,
        last_failure: Option<String>,
        time_until_retry: Duration,
    },
    /// The operation ran past its deadline and was abandoned
    #[error("call through circuit '{name}' exceeded its {timeout:?} deadline")]
    Timeout { name: String, timeout: Duration },
    /// The operation's own error, passed through unchanged
    #[error(transparent)]
    Operation(E),
}

impl<E> BreakerError<E> {
    /// True when the breaker refused to attempt the call
    pub fn is_rejected(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, BreakerError::Timeout { .. })
    }

    pub fn operation_error(&self) -> Option<&E> {
        match self {
            BreakerError::Operation(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_operation_error(self) -> Option<E> {
        match self {
            BreakerError::Operation(e) => Some(e),
            _ => None,
        }
    }
}

/// Invalid breaker or registry configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be {requirement} (got {value})")]
    Invalid {
        field: &'static str,
        requirement: &'static str,
        value: String,
    },
    #[error("preset '{name}': {source}")]
    Preset {
        name: String,
        source: Box<ConfigError>,
    },
}

impl ConfigError {
    pub(crate) fn invalid(
        field: &'static str,
        requirement: &'static str,
        value: impl fmt::Display,
    ) -> Self {
        ConfigError::Invalid {
            field,
            requirement,
            value: value.to_string(),
        }
    }
}
