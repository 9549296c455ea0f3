//! Tiered cache over interchangeable key/value stores
//!
//! Tiers are probed fastest first. A fresh hit is copied into every faster
//! tier (promotion) before it is returned; expired or foreign-version copies
//! are deleted from the tier they were found in and the probe moves on.

use crate::entry::CacheEntry;
use crate::error::CacheResult;
use crate::store::KeyValueStore;
use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tradecost_core::{Clock, SystemClock};

/// Storage tier, ordered by increasing latency
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TierKind {
    /// Fast volatile
    Memory,
    /// Persistent small
    Local,
    /// Persistent large
    Bulk,
}

impl TierKind {
    /// Every tier, fastest first
    pub const ALL: [TierKind; 3] = [TierKind::Memory, TierKind::Local, TierKind::Bulk];
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TierKind::Memory => write!(f, "memory"),
            TierKind::Local => write!(f, "local"),
            TierKind::Bulk => write!(f, "bulk"),
        }
    }
}

/// Options for `TieredCache::set`
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// Time to live; `None` never expires
    pub ttl: Option<Duration>,
    /// Tiers to write; `None` writes all configured tiers
    pub tiers: Option<Vec<TierKind>>,
}

impl SetOptions {
    /// Options with a TTL, writing all tiers
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            tiers: None,
        }
    }

    /// Restricts the write to `tiers`
    pub fn in_tiers(mut self, tiers: impl Into<Vec<TierKind>>) -> Self {
        self.tiers = Some(tiers.into());
        self
    }
}

/// Outcome of probing the tiers for a key
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T = serde_json::Value> {
    /// Unexpired entry written under the running schema version
    Fresh(CacheEntry<T>),
    /// Expired entry; already purged, usable only for degraded reads
    Stale(CacheEntry<T>),
    Miss,
}

impl<T> Lookup<T> {
    /// Returns the fresh value, if any
    pub fn fresh(self) -> Option<T> {
        match self {
            Lookup::Fresh(entry) => Some(entry.value),
            _ => None,
        }
    }

    /// Returns the fresh or stale value, if any
    pub fn any(self) -> Option<T> {
        match self {
            Lookup::Fresh(entry) | Lookup::Stale(entry) => Some(entry.value),
            Lookup::Miss => None,
        }
    }

    /// Returns true if a fresh entry was found
    pub fn is_fresh(&self) -> bool {
        matches!(self, Lookup::Fresh(_))
    }
}

/// One logical cache merged from several storage tiers
pub struct TieredCache {
    namespace: String,
    schema_version: String,
    clock: Arc<dyn Clock>,
    tiers: Vec<(TierKind, Arc<dyn KeyValueStore>)>,
}

impl fmt::Debug for TieredCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TieredCache")
            .field("namespace", &self.namespace)
            .field("schema_version", &self.schema_version)
            .field("tiers", &self.tier_kinds())
            .finish()
    }
}

impl TieredCache {
    /// Creates a cache with no tiers
    pub fn new(namespace: impl Into<String>, schema_version: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            schema_version: schema_version.into(),
            clock: Arc::new(SystemClock),
            tiers: Vec::new(),
        }
    }

    /// Sets the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Adds (or replaces) the store backing `kind`
    pub fn with_tier(mut self, kind: TierKind, store: Arc<dyn KeyValueStore>) -> Self {
        self.tiers.retain(|(existing, _)| *existing != kind);
        self.tiers.push((kind, store));
        self.tiers.sort_by_key(|(kind, _)| *kind);
        self
    }

    /// Returns the key namespace
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the running schema version
    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    /// Returns the configured tiers, fastest first
    pub fn tier_kinds(&self) -> Vec<TierKind> {
        self.tiers.iter().map(|(kind, _)| *kind).collect()
    }

    /// Returns the store backing `kind`
    pub fn tier(&self, kind: TierKind) -> Option<Arc<dyn KeyValueStore>> {
        self.tiers
            .iter()
            .find(|(existing, _)| *existing == kind)
            .map(|(_, store)| Arc::clone(store))
    }

    /// Physical key for a logical key
    pub fn full_key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    /// Writes `value` to the requested tiers
    ///
    /// Per-tier failures (quota, I/O) are logged and do not fail the call;
    /// only a value that cannot be serialized is an error.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        options: SetOptions,
    ) -> CacheResult<()> {
        let entry = CacheEntry::new(value, self.clock.now(), options.ttl, self.schema_version.as_str());
        let raw = entry.encode()?;
        let full_key = self.full_key(key);

        let targets: Vec<&Arc<dyn KeyValueStore>> = self
            .tiers
            .iter()
            .filter(|(kind, _)| {
                options
                    .tiers
                    .as_ref()
                    .is_none_or(|wanted| wanted.contains(kind))
            })
            .map(|(_, store)| store)
            .collect();

        self.write_all(&full_key, &raw, targets).await;
        Ok(())
    }

    /// Probes the tiers for `key`
    pub async fn lookup(&self, key: &str) -> Lookup {
        let full_key = self.full_key(key);
        let now = self.clock.now();
        let mut stale = None;

        for (index, (kind, store)) in self.tiers.iter().enumerate() {
            let raw = match store.get(&full_key).await {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(e) => {
                    log::warn!("Cache read from {} tier failed for {}: {}", kind, full_key, e);
                    continue;
                }
            };

            match CacheEntry::<serde_json::Value>::decode(&raw) {
                Ok(entry) if entry.is_fresh(now, &self.schema_version) => {
                    if index > 0 {
                        log::debug!("Promoting {} from {} tier", full_key, kind);
                        let faster = self.tiers[..index].iter().map(|(_, store)| store).collect();
                        self.write_all(&full_key, &raw, faster).await;
                    }
                    return Lookup::Fresh(entry);
                }
                Ok(entry) if entry.matches_version(&self.schema_version) => {
                    log::debug!("Expired entry for {} in {} tier", full_key, kind);
                    self.purge(*kind, store, &full_key).await;
                    stale.get_or_insert(entry);
                }
                Ok(entry) => {
                    log::debug!(
                        "Schema {} entry for {} in {} tier is outdated",
                        entry.schema_version,
                        full_key,
                        kind
                    );
                    self.purge(*kind, store, &full_key).await;
                }
                Err(e) => {
                    log::warn!("Undecodable entry for {} in {} tier: {}", full_key, kind, e);
                    self.purge(*kind, store, &full_key).await;
                }
            }
        }

        match stale {
            Some(entry) => Lookup::Stale(entry),
            None => Lookup::Miss,
        }
    }

    /// Returns the fresh value for `key`, or `None` on a miss
    ///
    /// A stored value that does not decode into `T` is also a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.lookup(key).await.fresh()?;
        match serde_json::from_value(value) {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!("Cached value for {} has an unexpected shape: {}", key, e);
                None
            }
        }
    }

    /// Deletes `key` from every tier
    pub async fn remove(&self, key: &str) {
        let full_key = self.full_key(key);
        for (kind, store) in &self.tiers {
            self.purge(*kind, store, &full_key).await;
        }
    }

    /// Deletes every key under the namespace, narrowed by `prefix`
    ///
    /// Returns the number of records removed across all tiers.
    pub async fn clear(&self, prefix: Option<&str>) -> usize {
        let full_prefix = self.full_key(prefix.unwrap_or(""));
        let mut removed = 0;

        for (kind, store) in &self.tiers {
            match store.clear(&full_prefix).await {
                Ok(count) => removed += count,
                Err(e) => log::warn!("Clearing {} tier failed: {}", kind, e),
            }
        }

        log::info!("Cleared {} cache records under '{}'", removed, full_prefix);
        removed
    }

    async fn write_all(&self, full_key: &str, raw: &str, stores: Vec<&Arc<dyn KeyValueStore>>) {
        let writes = stores.into_iter().map(|store| async move {
            if let Err(e) = store.set(full_key, raw.to_string()).await {
                log::warn!("Cache write to {} tier failed for {}: {}", store.name(), full_key, e);
            }
        });
        join_all(writes).await;
    }

    async fn purge(&self, kind: TierKind, store: &Arc<dyn KeyValueStore>, full_key: &str) {
        if let Err(e) = store.delete(full_key).await {
            log::warn!("Cache delete from {} tier failed for {}: {}", kind, full_key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use serde_json::json;
    use tradecost_core::{ManualClock, Timestamp};

    fn memory_cache() -> (TieredCache, ManualClock) {
        let clock = ManualClock::new(Timestamp::from_millis(1_000));
        let cache = TieredCache::new("app", "1")
            .with_clock(Arc::new(clock.clone()))
            .with_tier(TierKind::Memory, Arc::new(MemoryStore::new()));
        (cache, clock)
    }

    #[test]
    fn test_tiers_sorted_by_latency() {
        let cache = TieredCache::new("app", "1")
            .with_tier(TierKind::Bulk, Arc::new(MemoryStore::new()))
            .with_tier(TierKind::Memory, Arc::new(MemoryStore::new()))
            .with_tier(TierKind::Local, Arc::new(MemoryStore::new()));

        assert_eq!(cache.tier_kinds(), TierKind::ALL.to_vec());
    }

    #[test]
    fn test_full_key() {
        let (cache, _) = memory_cache();
        assert_eq!(cache.full_key("costs:/fees"), "app:costs:/fees");
    }

    #[tokio::test]
    async fn test_expired_lookup_is_stale_then_miss() {
        let (cache, clock) = memory_cache();
        cache
            .set("k", &json!(1), SetOptions::with_ttl(Duration::from_millis(100)))
            .await
            .unwrap();

        clock.advance(Duration::from_millis(101));
        assert!(matches!(cache.lookup("k").await, Lookup::Stale(_)));
        // The stale copy was purged by the first lookup
        assert_eq!(cache.lookup("k").await, Lookup::Miss);
    }

    #[tokio::test]
    async fn test_get_with_wrong_type_is_miss() {
        let (cache, _) = memory_cache();
        cache.set("k", "text", SetOptions::default()).await.unwrap();

        assert_eq!(cache.get::<u32>("k").await, None);
        assert_eq!(cache.get::<String>("k").await, Some("text".to_string()));
    }

    #[tokio::test]
    async fn test_lookup_helpers() {
        let (cache, _) = memory_cache();
        cache.set("k", &7, SetOptions::default()).await.unwrap();

        let lookup = cache.lookup("k").await;
        assert!(lookup.is_fresh());
        assert_eq!(lookup.any(), Some(json!(7)));
    }
}
