//! Tiered client-side cache
//!
//! This crate provides:
//! - The `KeyValueStore` capability and three backends:
//!   `MemoryStore` (fast volatile), `FileStore` (persistent small) and
//!   `SqliteStore` (persistent large)
//! - `CacheEntry`, the `{ value, storedAt, expiresAt?, schemaVersion }`
//!   record layout used for everything persisted by the data layer
//! - `TieredCache`, which merges the tiers with TTL expiry and
//!   read-through promotion
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tradecost_cache::{MemoryStore, SetOptions, TierKind, TieredCache};
//!
//! # tokio_test_runtime(async {
//! let cache = TieredCache::new("tradecost", "1")
//!     .with_tier(TierKind::Memory, Arc::new(MemoryStore::new()));
//!
//! cache
//!     .set("costs:/fees", &42, SetOptions::with_ttl(Duration::from_secs(60)))
//!     .await
//!     .unwrap();
//! assert_eq!(cache.get::<i32>("costs:/fees").await, Some(42));
//! # });
//! # fn tokio_test_runtime<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

mod entry;
mod error;
mod file;
mod memory;
mod sqlite;
mod store;
mod tiered;

pub use entry::CacheEntry;
pub use error::{CacheError, CacheResult};
pub use file::{FileStore, DEFAULT_QUOTA_BYTES};
pub use memory::MemoryStore;
pub use sqlite::{DbPool, SqliteStore};
pub use store::KeyValueStore;
pub use tiered::{Lookup, SetOptions, TierKind, TieredCache};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_all_exports_accessible() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let cache = TieredCache::new("tradecost", "1").with_tier(TierKind::Memory, store);
        let _: SetOptions = SetOptions::default();
        let _: Lookup = Lookup::Miss;
        let _: CacheEntry<i32> = CacheEntry::new(1, tradecost_core::Timestamp::now(), None, "1");
        let _: CacheError = CacheError::backend("memory", "test");
        assert_eq!(DEFAULT_QUOTA_BYTES, 5 * 1024 * 1024);
        assert_eq!(cache.namespace(), "tradecost");
    }
}
