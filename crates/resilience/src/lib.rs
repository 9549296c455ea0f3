//! Resilience patterns for calls against unreliable endpoints
//!
//! This crate provides:
//! - A per-endpoint circuit breaker registry
//! - Retry with exponential backoff (no jitter)
//! - Per-attempt timeouts
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use tradecost_core::EndpointId;
//! use tradecost_resilience::{
//!     Admission, CircuitBreakerConfig, CircuitBreakerRegistry, RequestExecutor, RetryPolicy,
//! };
//!
//! // Retry with exponential backoff
//! let policy = RetryPolicy::new(3).with_initial_backoff(Duration::from_millis(300));
//! let executor = RequestExecutor::new(policy);
//!
//! // Circuit breaker
//! let registry = CircuitBreakerRegistry::new(CircuitBreakerConfig::new(5, Duration::from_secs(30)));
//! assert_eq!(registry.admit(&EndpointId::new("costs")), Admission::Proceed);
//! ```

mod circuit_breaker;
mod error;
mod executor;
mod retry;
mod timeout;

pub use circuit_breaker::{
    Admission, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitRecord, CircuitState,
};
pub use error::{ResilienceError, ResilienceResult};
pub use executor::RequestExecutor;
pub use retry::RetryPolicy;
pub use timeout::with_timeout;
