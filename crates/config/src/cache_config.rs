//! Cache section: namespace, schema version and tier sizing

use crate::validation::{ConfigSection, ValidationError, Validator};
use crate::{ConfigError, ConfigResult};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Storage settings for the tiered cache
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Prefix for every persisted key
    pub namespace: String,

    /// Stamped on every record; records with another version are discarded
    pub schema_version: String,

    /// Directory holding `local.json` and `bulk.db` (platform data dir if unset)
    pub data_dir: Option<PathBuf>,

    /// Byte budget of the Local tier file
    pub local_quota_bytes: u64,

    /// Initial capacity of the Memory tier
    pub memory_capacity: usize,

    /// TTL used by callers that don't pass one
    pub default_ttl_secs: u64,
}

impl CacheConfig {
    /// Returns `data_dir`, falling back to the platform data directory
    pub fn resolve_data_dir(&self) -> ConfigResult<PathBuf> {
        if let Some(ref dir) = self.data_dir {
            return Ok(dir.clone());
        }

        ProjectDirs::from("", "", "tradecost")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or(ConfigError::NoPlatformDir { kind: "data" })
    }

    /// Default TTL as a duration
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: "tradecost".to_string(),
            schema_version: "1".to_string(),
            data_dir: None,
            local_quota_bytes: 5 * 1024 * 1024,
            memory_capacity: 10_000,
            default_ttl_secs: 300,
        }
    }
}

impl ConfigSection for CacheConfig {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut results = vec![
            Validator::not_empty(&self.namespace, "cache.namespace"),
            Validator::not_empty(&self.schema_version, "cache.schema_version"),
            Validator::in_range(
                self.local_quota_bytes,
                1024,
                1024 * 1024 * 1024,
                "cache.local_quota_bytes",
            ),
            Validator::in_range(self.memory_capacity, 0, 10_000_000, "cache.memory_capacity"),
            Validator::in_range(self.default_ttl_secs, 0, 7 * 24 * 3600, "cache.default_ttl_secs"),
        ];

        // Separators would let one namespace clear another's keys
        if self.namespace.contains(':') || self.namespace.contains('/') {
            results.push(Err(ValidationError::with_value(
                "cache.namespace",
                "must not contain ':' or '/'",
                &self.namespace,
            )));
        }

        if let Some(ref dir) = self.data_dir {
            if dir.as_os_str().is_empty() {
                results.push(Err(ValidationError::new(
                    "cache.data_dir",
                    "must not be empty when set",
                )));
            } else if dir.exists() {
                results.push(Validator::is_directory(dir, "cache.data_dir"));
            }
        }

        Validator::collect_errors(results)
    }

    fn merge(&mut self, other: Self) {
        self.namespace = other.namespace;
        self.schema_version = other.schema_version;
        self.data_dir = other.data_dir;
        self.local_quota_bytes = other.local_quota_bytes;
        self.memory_capacity = other.memory_capacity;
        self.default_ttl_secs = other.default_ttl_secs;
    }

    fn section_name(&self) -> &'static str {
        "cache"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_is_valid() {
        assert!(CacheConfig::default().validate().is_ok());
    }

    #[test]
    fn test_namespace_with_separator_rejected() {
        let config = CacheConfig {
            namespace: "trade:cost".to_string(),
            ..CacheConfig::default()
        };
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "cache.namespace");
    }

    #[test]
    fn test_empty_schema_version_rejected() {
        let config = CacheConfig {
            schema_version: "  ".to_string(),
            ..CacheConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_data_dir_must_be_directory() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("not-a-dir");
        std::fs::write(&file, "x").unwrap();

        let config = CacheConfig {
            data_dir: Some(file),
            ..CacheConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_explicit_data_dir_wins() {
        let config = CacheConfig {
            data_dir: Some(PathBuf::from("/var/lib/tradecost")),
            ..CacheConfig::default()
        };
        assert_eq!(
            config.resolve_data_dir().unwrap(),
            PathBuf::from("/var/lib/tradecost")
        );
    }

    #[test]
    fn test_default_ttl() {
        assert_eq!(CacheConfig::default().default_ttl(), Duration::from_secs(300));
    }
}
