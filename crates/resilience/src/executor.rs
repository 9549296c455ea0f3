//! Retrying request executor

use crate::retry::RetryPolicy;
use crate::timeout::with_timeout;
use std::future::Future;
use tradecost_core::{Request, RequestError, Transport};

/// Runs one logical call with bounded retries
///
/// Terminal errors abort immediately. Transient errors are retried after
/// an exponential backoff until the retries run out, at which point the
/// last error is returned.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestExecutor {
    policy: RetryPolicy,
}

impl RequestExecutor {
    /// Creates an executor with the given policy
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Returns the retry policy
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Executes `operation` with the policy's retry count
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, RequestError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RequestError>>,
    {
        self.execute_with_retries(self.policy.max_retries(), operation)
            .await
    }

    /// Executes `operation`, allowing at most `max_retries` extra attempts
    pub async fn execute_with_retries<T, F, Fut>(
        &self,
        max_retries: u32,
        mut operation: F,
    ) -> Result<T, RequestError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RequestError>>,
    {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let result = match self.policy.attempt_timeout() {
                Some(limit) => with_timeout(limit, operation())
                    .await
                    .unwrap_or_else(|e| Err(e.into())),
                None => operation().await,
            };

            let error = match result {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !error.is_retryable() {
                log::debug!("Attempt {} failed with terminal error: {}", attempt, error);
                return Err(error);
            }

            if attempt > max_retries {
                log::warn!("Giving up after {} attempts: {}", attempt, error);
                return Err(error);
            }

            let delay = self.policy.delay_for_attempt(attempt);
            log::debug!(
                "Attempt {} failed ({}), retrying in {:?}",
                attempt,
                error,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Sends `request` through `transport` with retries
    ///
    /// `max_retries` overrides the policy's retry count when given.
    pub async fn send(
        &self,
        transport: &dyn Transport,
        request: &Request,
        max_retries: Option<u32>,
    ) -> Result<serde_json::Value, RequestError> {
        let retries = max_retries.unwrap_or(self.policy.max_retries());
        self.execute_with_retries(retries, || transport.send(request))
            .await
    }
}
