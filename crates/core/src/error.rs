//! Request error taxonomy and recovery classification
//!
//! Every failure the data layer can surface to a caller is a `RequestError`.
//! Errors are classified two ways:
//! - **Retry**: transient errors (network, timeout, 5xx) are retried with
//!   backoff; terminal errors (4xx, undecodable responses) are not.
//! - **Severity**: how the caller should treat the failure (see
//!   `ErrorSeverity` and `RecoveryAction`).
//!
//! Cache misses are not errors; they are `None`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Recovery actions that can be taken when a request fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Retry with exponential backoff (server temporarily unavailable)
    RetryWithBackoff,
    /// Serve cached or fallback data while the endpoint recovers
    ServeCached,
    /// Give up immediately; retrying cannot help
    FailFast,
}

impl fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RetryWithBackoff => write!(f, "Retrying with backoff"),
            Self::ServeCached => write!(f, "Serving cached data"),
            Self::FailFast => write!(f, "Failing fast"),
        }
    }
}

/// Error severity classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Error can be automatically recovered from
    Recoverable,
    /// Endpoint degraded; cached or fallback data is served
    Degraded,
    /// Request can never succeed as issued
    Fatal,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recoverable => write!(f, "Recoverable"),
            Self::Degraded => write!(f, "Degraded"),
            Self::Fatal => write!(f, "Fatal"),
        }
    }
}

/// Errors surfaced by a request against an endpoint
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RequestError {
    // ===== Terminal =====
    /// Client-side error (4xx-equivalent)
    #[error("Client error {status}: {message}")]
    Client { status: u16, message: String },

    /// Response could not be decoded into the expected type
    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    /// Request cannot be routed (unknown endpoint, bad URL)
    #[error("Misconfigured request: {message}")]
    Misconfigured { message: String },

    // ===== Transient =====
    /// Server-side error (5xx-equivalent)
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Connection failure before a response was received
    #[error("Network error: {message}")]
    Network { message: String },

    /// Attempt exceeded its time budget
    #[error("Request timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    // ===== Circuit / availability =====
    /// Circuit breaker rejected the call
    #[error("Circuit open for endpoint '{endpoint}'")]
    CircuitOpen { endpoint: String },

    /// Endpoint is unavailable and no cached data exists
    #[error("Endpoint '{endpoint}' is unavailable")]
    EndpointUnavailable { endpoint: String },

    /// Process is offline
    #[error("Network is offline")]
    Offline,
}

impl RequestError {
    /// Helper to create a client (4xx) error
    pub fn client(status: u16, message: impl Into<String>) -> Self {
        Self::Client {
            status,
            message: message.into(),
        }
    }

    /// Helper to create a server (5xx) error
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    /// Helper to create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Helper to create a timeout error
    pub fn timeout(after: std::time::Duration) -> Self {
        Self::Timeout {
            after_ms: after.as_millis() as u64,
        }
    }

    /// Helper to create an invalid response error
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// Helper to create an endpoint unavailable error
    pub fn unavailable(endpoint: impl fmt::Display) -> Self {
        Self::EndpointUnavailable {
            endpoint: endpoint.to_string(),
        }
    }

    /// Maps an HTTP status code to the matching error class
    ///
    /// Returns `None` for non-error statuses.
    pub fn from_status(status: u16, message: impl Into<String>) -> Option<Self> {
        match status {
            400..=499 => Some(Self::client(status, message)),
            500..=599 => Some(Self::server(status, message)),
            _ => None,
        }
    }

    /// Returns true if the error is worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Server { .. } | Self::Network { .. } | Self::Timeout { .. }
        )
    }

    /// Returns true if retrying can never help
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Client { .. } | Self::InvalidResponse { .. } | Self::Misconfigured { .. }
        )
    }

    /// Returns the severity level of this error
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Server { .. } | Self::Network { .. } | Self::Timeout { .. } => {
                ErrorSeverity::Recoverable
            }

            Self::CircuitOpen { .. } | Self::EndpointUnavailable { .. } | Self::Offline => {
                ErrorSeverity::Degraded
            }

            Self::Client { .. } | Self::InvalidResponse { .. } | Self::Misconfigured { .. } => {
                ErrorSeverity::Fatal
            }
        }
    }

    /// Returns the recommended recovery action for this error
    pub fn recovery_action(&self) -> RecoveryAction {
        match self.severity() {
            ErrorSeverity::Recoverable => RecoveryAction::RetryWithBackoff,
            ErrorSeverity::Degraded => RecoveryAction::ServeCached,
            ErrorSeverity::Fatal => RecoveryAction::FailFast,
        }
    }
}
