//! Retry policy with exponential backoff

use std::time::Duration;

/// Retry policy configuration
///
/// Delays grow as `initial_backoff * 2^(attempt - 1)` with no jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first one
    max_retries: u32,
    /// Delay before the first retry
    initial_backoff: Duration,
    /// Time budget of a single attempt
    attempt_timeout: Option<Duration>,
}

impl RetryPolicy {
    /// Creates a policy with the default backoff and attempt timeout
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::from_millis(300),
            attempt_timeout: Some(Duration::from_secs(10)),
        }
    }

    /// Sets the initial backoff
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Sets the per-attempt timeout; `None` lets attempts run unbounded
    pub fn with_attempt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let factor = 2u32.checked_pow(attempt - 1).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(Duration::MAX)
    }

    /// Returns the number of retries
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Returns the total number of attempts, including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Returns the initial backoff
    pub fn initial_backoff(&self) -> Duration {
        self.initial_backoff
    }

    /// Returns the per-attempt timeout
    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}
