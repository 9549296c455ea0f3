//! Error types for transport setup and data layer lifecycle
//!
//! Per-request failures travel as `RequestError` inside envelopes; these
//! errors only surface from constructors and `DataLayer::init`.

use thiserror::Error;
use tradecost_cache::CacheError;
use tradecost_config::ConfigError;
use tradecost_sync_engine::SyncError;

/// Result type for network operations
pub type NetworkResult<T> = Result<T, NetworkError>;

/// Errors that can occur while building the network stack
#[derive(Debug, Error)]
pub enum NetworkError {
    /// HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration missing or invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A storage tier could not be opened
    #[error("Storage error: {0}")]
    Storage(#[from] CacheError),

    /// Sync queue could not be restored
    #[error("Sync queue error: {0}")]
    Sync(#[from] SyncError),

    /// Network unavailable
    #[error("Network is unavailable")]
    NetworkUnavailable,
}

impl NetworkError {
    /// Returns true if trying again later may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            NetworkError::NetworkUnavailable => true,
            NetworkError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_unavailable() {
        let err = NetworkError::NetworkUnavailable;
        assert!(err.to_string().contains("unavailable"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_config_error_not_retryable() {
        let err = NetworkError::from(ConfigError::NoPlatformDir { kind: "data" });
        assert!(err.to_string().contains("Configuration error"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_storage_error_wraps_cache_error() {
        let err = NetworkError::from(CacheError::backend("bulk", "locked"));
        assert!(matches!(err, NetworkError::Storage(_)));
    }
}
