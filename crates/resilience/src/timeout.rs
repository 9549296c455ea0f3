//! Timeout handling utilities

use crate::error::{ResilienceError, ResilienceResult};
use std::future::Future;
use std::time::Duration;

/// Runs `future`, failing with `ResilienceError::Timeout` if it takes longer
/// than `duration`
///
/// The future is dropped on timeout.
pub async fn with_timeout<F>(duration: Duration, future: F) -> ResilienceResult<F::Output>
where
    F: Future,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| ResilienceError::Timeout(duration))
}
