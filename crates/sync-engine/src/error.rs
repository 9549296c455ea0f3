//! Error types for sync operations

use thiserror::Error;
use tradecost_cache::CacheError;
use tradecost_core::Method;

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while queueing or restoring mutations
#[derive(Debug, Error)]
pub enum SyncError {
    /// Only state-changing requests can be queued
    #[error("{0} requests cannot be queued")]
    NotMutating(Method),

    /// Persisted queue could not be read
    #[error("Storage error: {0}")]
    Storage(#[from] CacheError),
}
