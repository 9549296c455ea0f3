//! Circuit breaker and retry sections

use crate::validation::{ConfigSection, ValidationError, Validator};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tradecost_resilience::{CircuitBreakerConfig, RetryPolicy};

/// Per-endpoint circuit breaker settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CircuitConfig {
    /// Consecutive failures that open a circuit
    pub failure_threshold: u32,

    /// How long an open circuit rejects calls before a trial
    pub half_open_timeout_ms: u64,
}

impl CircuitConfig {
    /// Builds the registry configuration
    pub fn to_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig::new(
            self.failure_threshold,
            Duration::from_millis(self.half_open_timeout_ms),
        )
    }
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            half_open_timeout_ms: 30_000,
        }
    }
}

impl ConfigSection for CircuitConfig {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        Validator::collect_errors(vec![
            Validator::in_range(self.failure_threshold, 1, 1000, "circuit.failure_threshold"),
            Validator::in_range(
                self.half_open_timeout_ms,
                100,
                3_600_000,
                "circuit.half_open_timeout_ms",
            ),
        ])
    }

    fn merge(&mut self, other: Self) {
        self.failure_threshold = other.failure_threshold;
        self.half_open_timeout_ms = other.half_open_timeout_ms;
    }

    fn section_name(&self) -> &'static str {
        "circuit"
    }
}

/// Retry settings for the request executor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    /// Extra attempts after the first for transient errors
    pub max_retries: u32,

    /// Delay before the first retry; doubles each time
    pub initial_backoff_ms: u64,

    /// Per-attempt timeout; 0 disables it
    pub attempt_timeout_ms: u64,
}

impl RetryConfig {
    /// Builds the executor's retry policy
    pub fn to_policy(&self) -> RetryPolicy {
        let timeout = (self.attempt_timeout_ms > 0)
            .then(|| Duration::from_millis(self.attempt_timeout_ms));

        RetryPolicy::new(self.max_retries)
            .with_initial_backoff(Duration::from_millis(self.initial_backoff_ms))
            .with_attempt_timeout(timeout)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 300,
            attempt_timeout_ms: 10_000,
        }
    }
}

impl ConfigSection for RetryConfig {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        Validator::collect_errors(vec![
            Validator::in_range(self.max_retries, 0, 10, "retry.max_retries"),
            Validator::in_range(self.initial_backoff_ms, 1, 60_000, "retry.initial_backoff_ms"),
            Validator::in_range(self.attempt_timeout_ms, 0, 300_000, "retry.attempt_timeout_ms"),
        ])
    }

    fn merge(&mut self, other: Self) {
        self.max_retries = other.max_retries;
        self.initial_backoff_ms = other.initial_backoff_ms;
        self.attempt_timeout_ms = other.attempt_timeout_ms;
    }

    fn section_name(&self) -> &'static str {
        "retry"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(CircuitConfig::default().validate().is_ok());
        assert!(RetryConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let config = CircuitConfig {
            failure_threshold: 0,
            ..CircuitConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_breaker_config_conversion() {
        let breaker = CircuitConfig::default().to_breaker_config();
        assert_eq!(breaker.failure_threshold(), 5);
        assert_eq!(breaker.half_open_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_retry_policy_conversion() {
        let policy = RetryConfig::default().to_policy();
        assert_eq!(policy.max_retries(), 3);
        assert_eq!(policy.initial_backoff(), Duration::from_millis(300));
        assert_eq!(policy.attempt_timeout(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_zero_attempt_timeout_disables_it() {
        let config = RetryConfig {
            attempt_timeout_ms: 0,
            ..RetryConfig::default()
        };
        assert_eq!(config.to_policy().attempt_timeout(), None);
    }

    #[test]
    fn test_too_many_retries_rejected() {
        let config = RetryConfig {
            max_retries: 50,
            ..RetryConfig::default()
        };
        let errors = config.validate().unwrap_err();
        assert_eq!(errors[0].field, "retry.max_retries");
        assert_eq!(errors[0].value.as_deref(), Some("50"));
    }
}
