//! Error types for resilience operations

use std::time::Duration;
use thiserror::Error;
use tradecost_core::{RequestError, Timestamp};

/// Result type for resilience operations
pub type ResilienceResult<T> = Result<T, ResilienceError>;

/// Errors that can occur in resilience operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResilienceError {
    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Circuit breaker rejected the call
    #[error("Circuit breaker is open for '{endpoint}' (next attempt at {retry_at})")]
    CircuitOpen { endpoint: String, retry_at: Timestamp },
}

impl From<ResilienceError> for RequestError {
    fn from(err: ResilienceError) -> Self {
        match err {
            ResilienceError::Timeout(after) => RequestError::timeout(after),
            ResilienceError::CircuitOpen { endpoint, .. } => RequestError::CircuitOpen { endpoint },
        }
    }
}
