//! Configuration errors
//!
//! `ConfigError` covers loading and saving `config.toml` and turning its
//! values into runtime objects. Per-field problems are `ValidationError`s,
//! collected so one pass reports all of them.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading, saving or applying the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read, or is blank
    #[error("Cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The config file is not valid TOML for `Config`
    #[error("Config file {path} is not valid: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A step of the atomic save failed; `path` is what was being written
    #[error("Cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The config could not be rendered as TOML
    #[error("Cannot render config: {0}")]
    Render(#[from] toml::ser::Error),

    /// One or more settings are out of range or malformed
    #[error("Invalid configuration: {}", join(.0))]
    Invalid(Vec<ValidationError>),

    /// An endpoint base URL cannot be used to build request URLs
    #[error("Endpoint '{endpoint}' has an unusable base URL '{url}': {reason}")]
    InvalidEndpoint {
        endpoint: String,
        url: String,
        reason: String,
    },

    /// The platform has no standard location for this directory
    #[error("No {kind} directory available on this platform; set one explicitly")]
    NoPlatformDir { kind: &'static str },
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ConfigError {
    /// Problems found by validation, empty for every other variant
    pub fn problems(&self) -> &[ValidationError] {
        match self {
            ConfigError::Invalid(errors) => errors,
            _ => &[],
        }
    }
}

/// One invalid setting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted key of the setting, e.g. `retry.max_retries`
    pub field: String,

    pub message: String,

    /// The rejected value, when it helps to show it
    pub value: Option<String>,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            value: None,
        }
    }

    /// Validation error that also reports the rejected value
    pub fn with_value(
        field: impl Into<String>,
        message: impl Into<String>,
        value: impl ToString,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            value: Some(value.to_string()),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)?;
        if let Some(ref value) = self.value {
            write!(f, " (got '{}')", value)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::new("retry.max_retries", "must be between 0 and 10");
        assert_eq!(err.to_string(), "retry.max_retries: must be between 0 and 10");

        let err = ValidationError::with_value("sync.batch_size", "must be between 1 and 1000", 0);
        assert_eq!(
            err.to_string(),
            "sync.batch_size: must be between 1 and 1000 (got '0')"
        );
    }

    #[test]
    fn test_invalid_lists_every_problem() {
        let err = ConfigError::Invalid(vec![
            ValidationError::new("retry.max_retries", "too large"),
            ValidationError::new("sync.batch_size", "too small"),
        ]);
        assert_eq!(
            err.to_string(),
            "Invalid configuration: retry.max_retries: too large; sync.batch_size: too small"
        );
        assert_eq!(err.problems().len(), 2);
    }

    #[test]
    fn test_invalid_endpoint_names_endpoint_and_url() {
        let err = ConfigError::InvalidEndpoint {
            endpoint: "fees".to_string(),
            url: "http://bad host".to_string(),
            reason: "invalid domain character".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("'fees'"));
        assert!(message.contains("'http://bad host'"));
        assert!(err.problems().is_empty());
    }
}
