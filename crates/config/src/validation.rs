//! Validation helpers shared by every config section

pub use crate::error::ValidationError;
use std::path::Path;
use url::Url;

/// A config section that validates and merges itself
///
/// Adding a section means implementing this trait and adding a field to
/// `Config`; nothing else in the loading path changes.
pub trait ConfigSection: Default {
    /// Validates the section, returning every problem found
    fn validate(&self) -> Result<(), Vec<ValidationError>>;

    /// Merges another section into this one; values from `other` win
    fn merge(&mut self, other: Self);

    /// Section name as it appears in the TOML file
    fn section_name(&self) -> &'static str;
}

/// Common validators for config values
pub struct Validator;

impl Validator {
    /// Validates that a numeric value is within an inclusive range
    pub fn in_range<T>(value: T, min: T, max: T, field: &str) -> Result<(), ValidationError>
    where
        T: PartialOrd + std::fmt::Display + Copy,
    {
        if value < min || value > max {
            Err(ValidationError::with_value(
                field,
                format!("must be between {} and {}", min, max),
                value,
            ))
        } else {
            Ok(())
        }
    }

    /// Validates that a path is a directory
    pub fn is_directory(path: &Path, field: &str) -> Result<(), ValidationError> {
        if !path.is_dir() {
            Err(ValidationError::with_value(
                field,
                "path is not a directory",
                path.display(),
            ))
        } else {
            Ok(())
        }
    }

    /// Validates that a string is not blank
    pub fn not_empty(value: &str, field: &str) -> Result<(), ValidationError> {
        if value.trim().is_empty() {
            Err(ValidationError::new(field, "must not be empty"))
        } else {
            Ok(())
        }
    }

    /// Validates that a string is an absolute http(s) URL with a host
    pub fn http_url(value: &str, field: &str) -> Result<(), ValidationError> {
        Self::parse_http_url(value)
            .map(|_| ())
            .map_err(|reason| ValidationError::with_value(field, reason, value))
    }

    /// Parses an absolute http(s) URL, rejecting other schemes and hostless URLs
    pub fn parse_http_url(value: &str) -> Result<Url, String> {
        let url = Url::parse(value).map_err(|e| format!("not a valid URL ({})", e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!("scheme '{}' is not http or https", url.scheme()));
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err("URL has no host".to_string());
        }
        Ok(url)
    }

    /// Collects multiple validation results into a single result
    pub fn collect_errors(
        results: Vec<Result<(), ValidationError>>,
    ) -> Result<(), Vec<ValidationError>> {
        let errors: Vec<ValidationError> = results.into_iter().filter_map(|r| r.err()).collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_in_range_bounds_inclusive() {
        assert!(Validator::in_range(50, 0, 100, "test").is_ok());
        assert!(Validator::in_range(0, 0, 100, "test").is_ok());
        assert!(Validator::in_range(100, 0, 100, "test").is_ok());
        assert!(Validator::in_range(101, 0, 100, "test").is_err());
    }

    #[test]
    fn test_not_empty() {
        assert!(Validator::not_empty("  tradecost  ", "test").is_ok());
        assert!(Validator::not_empty("", "test").is_err());
        assert!(Validator::not_empty("   ", "test").is_err());
    }

    #[test]
    fn test_http_url() {
        assert!(Validator::http_url("https://api.example.com", "test").is_ok());
        assert!(Validator::http_url("http://localhost:8080/v1", "test").is_ok());
        assert!(Validator::http_url("https://", "test").is_err());
        assert!(Validator::http_url("http://", "test").is_err());
        assert!(Validator::http_url("api.example.com", "test").is_err());
        assert!(Validator::http_url("ftp://files.example.com", "test").is_err());
    }

    #[test]
    fn test_http_url_rejects_invalid_host() {
        let err = Validator::http_url("http://bad host/x", "network.endpoints.fees").unwrap_err();
        assert_eq!(err.field, "network.endpoints.fees");
        assert!(err.message.starts_with("not a valid URL"));
        assert_eq!(err.value.as_deref(), Some("http://bad host/x"));
    }

    #[test]
    fn test_collect_errors_some_err() {
        let results = vec![
            Ok(()),
            Err(ValidationError::new("field1", "error1")),
            Ok(()),
            Err(ValidationError::new("field2", "error2")),
        ];
        let errors = Validator::collect_errors(results).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[1].field, "field2");
    }

    #[test]
    fn test_is_directory_nonexistent() {
        let path = PathBuf::from("/this/path/definitely/does/not/exist");
        assert!(Validator::is_directory(&path, "test").is_err());
    }
}
