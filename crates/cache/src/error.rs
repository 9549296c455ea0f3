//! Error types for cache and storage operations

use thiserror::Error;

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors raised by storage tiers
///
/// The tiered cache recovers from all of these locally; they only surface
/// from direct `KeyValueStore` calls.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Write would exceed the tier's capacity
    #[error("Storage quota exceeded in {tier}: needs {needed}, limit {limit}")]
    QuotaExceeded {
        tier: &'static str,
        needed: u64,
        limit: u64,
    },

    /// Backend-specific failure
    #[error("Storage backend '{tier}' failed: {message}")]
    Backend { tier: &'static str, message: String },

    /// SQLite failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// File system failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CacheError {
    /// Helper for poisoned locks and other backend faults
    pub fn backend(tier: &'static str, message: impl Into<String>) -> Self {
        Self::Backend {
            tier,
            message: message.into(),
        }
    }

    /// Returns true if the error is a quota violation
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}
