//! Storage capability implemented by every cache tier

use crate::error::CacheResult;
use async_trait::async_trait;

/// String key/value storage backend
///
/// Values are opaque strings (serialized records). Implementations must be
/// safe to share between tasks.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Short name used in logs and errors
    fn name(&self) -> &'static str;

    /// Reads a value
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Writes a value, replacing any existing one
    async fn set(&self, key: &str, value: String) -> CacheResult<()>;

    /// Deletes a value; deleting a missing key is not an error
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Deletes every key starting with `prefix`, returning how many were removed
    async fn clear(&self, prefix: &str) -> CacheResult<usize>;
}
