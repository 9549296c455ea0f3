//! Offline sync queue section

use crate::cache_config::CacheConfig;
use crate::validation::{ConfigSection, ValidationError, Validator};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tradecost_sync_engine::SyncQueueConfig;

/// Settings for the offline mutation queue
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncConfig {
    /// Items attempted per flush
    pub batch_size: usize,

    /// Flush attempts before an item is dropped
    pub max_attempts: u32,

    /// Period of the background flusher
    pub flush_interval_secs: u64,
}

impl SyncConfig {
    /// Builds the queue configuration, sharing the cache's namespace
    pub fn to_queue_config(&self, cache: &CacheConfig) -> SyncQueueConfig {
        SyncQueueConfig {
            batch_size: self.batch_size,
            max_attempts: self.max_attempts,
            namespace: cache.namespace.clone(),
            schema_version: cache.schema_version.clone(),
        }
    }

    /// Flusher period as a duration
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            max_attempts: 5,
            flush_interval_secs: 30,
        }
    }
}

impl ConfigSection for SyncConfig {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        Validator::collect_errors(vec![
            Validator::in_range(self.batch_size, 1, 1000, "sync.batch_size"),
            Validator::in_range(self.max_attempts, 1, 100, "sync.max_attempts"),
            Validator::in_range(self.flush_interval_secs, 1, 86_400, "sync.flush_interval_secs"),
        ])
    }

    fn merge(&mut self, other: Self) {
        self.batch_size = other.batch_size;
        self.max_attempts = other.max_attempts;
        self.flush_interval_secs = other.flush_interval_secs;
    }

    fn section_name(&self) -> &'static str {
        "sync"
    }
}
