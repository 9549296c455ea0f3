//! Durable queue of mutations awaiting replay

use crate::error::{SyncError, SyncResult};
use crate::types::{FlushStats, MutationRequest, SyncQueueItem};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tradecost_cache::{CacheEntry, KeyValueStore};
use tradecost_core::{Clock, Connectivity, SystemClock, Transport};
use tradecost_resilience::RequestExecutor;

/// Configuration for the sync queue
#[derive(Debug, Clone)]
pub struct SyncQueueConfig {
    /// Items attempted per flush
    pub batch_size: usize,
    /// Flush attempts before an item is dropped
    pub max_attempts: u32,
    /// Namespace of the persisted queue record
    pub namespace: String,
    /// Schema version stamped on the persisted record
    pub schema_version: String,
}

impl SyncQueueConfig {
    /// Key of the persisted queue record
    pub fn storage_key(&self) -> String {
        format!("{}/sync-queue", self.namespace)
    }
}

impl Default for SyncQueueConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            max_attempts: 5,
            namespace: "tradecost".to_string(),
            schema_version: "1".to_string(),
        }
    }
}

/// FIFO queue of mutations that could not be applied
///
/// Every change is written through to the backing store, so queued items
/// survive restarts once `load` has been called.
pub struct SyncQueue {
    config: SyncQueueConfig,
    items: Mutex<VecDeque<SyncQueueItem>>,
    store: Option<Arc<dyn KeyValueStore>>,
    transport: Arc<dyn Transport>,
    executor: RequestExecutor,
    connectivity: Connectivity,
    clock: Arc<dyn Clock>,
    flushing: AtomicBool,
    // Keeps persisted snapshots in the order they were taken
    persist_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for SyncQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncQueue")
            .field("config", &self.config)
            .field("len", &self.len())
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

/// Clears the in-progress flag when a flush ends, however it ends
struct FlushGuard<'a>(&'a AtomicBool);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SyncQueue {
    /// Creates an empty, in-memory queue
    pub fn new(
        config: SyncQueueConfig,
        transport: Arc<dyn Transport>,
        connectivity: Connectivity,
    ) -> Self {
        Self {
            config,
            items: Mutex::new(VecDeque::new()),
            store: None,
            transport,
            executor: RequestExecutor::default(),
            connectivity,
            clock: Arc::new(SystemClock),
            flushing: AtomicBool::new(false),
            persist_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Persists the queue to `store`
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the executor used to replay items
    pub fn with_executor(mut self, executor: RequestExecutor) -> Self {
        self.executor = executor;
        self
    }

    /// Sets the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the configuration
    pub fn config(&self) -> &SyncQueueConfig {
        &self.config
    }

    /// Returns the connectivity signal the queue flushes on
    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    /// Restores items persisted by an earlier instance
    ///
    /// A record written under another schema version is discarded. Items
    /// already in memory stay behind the restored ones.
    pub async fn load(&self) -> SyncResult<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };

        let key = self.config.storage_key();
        let Some(raw) = store.get(&key).await? else {
            return Ok(0);
        };

        let Some(entry) =
            CacheEntry::<Vec<SyncQueueItem>>::decode_current(&raw, &self.config.schema_version)
        else {
            log::warn!("Discarding persisted sync queue at {}", key);
            store.delete(&key).await?;
            return Ok(0);
        };

        let restored = entry.value.len();
        {
            let mut items = self.lock();
            let existing: Vec<SyncQueueItem> = items.drain(..).collect();
            items.extend(entry.value);
            items.extend(existing);
        }

        log::info!("Restored {} queued mutations", restored);
        Ok(restored)
    }

    /// Appends a mutation and returns its id
    ///
    /// With a backing store the item is only accepted once the queue record
    /// has been written; otherwise the storage error is returned and the
    /// queue is left as it was.
    pub async fn enqueue(&self, mutation: MutationRequest) -> SyncResult<String> {
        if !mutation.method.is_mutating() {
            return Err(SyncError::NotMutating(mutation.method));
        }

        let item = SyncQueueItem::new(mutation, self.clock.now());
        let id = item.id.clone();
        let summary = format!("{} {}:{}", item.method, item.endpoint, item.path);
        self.lock().push_back(item);

        // Not durable means not accepted
        if let Err(e) = self.persist().await {
            self.lock().retain(|queued| queued.id != id);
            log::error!("Could not persist queued mutation {}: {}", summary, e);
            return Err(e);
        }

        log::info!("Queued {} as {}", summary, id);
        Ok(id)
    }

    /// Replays up to `batch_size` items (default from config), oldest first
    ///
    /// Does nothing while offline, or while another flush is running.
    /// Failed items go to the back of the queue until they reach the
    /// attempt limit, then they are dropped and reported in `exhausted`.
    pub async fn flush(&self, batch_size: Option<usize>) -> FlushStats {
        if !self.connectivity.is_online() {
            log::debug!("Offline, skipping sync queue flush");
            return FlushStats::skipped(self.len());
        }

        if self.flushing.swap(true, Ordering::AcqRel) {
            log::debug!("Sync queue flush already running");
            return FlushStats::default();
        }
        let _guard = FlushGuard(&self.flushing);

        let batch_size = batch_size.unwrap_or(self.config.batch_size);
        let batch: Vec<SyncQueueItem> = self.lock().iter().take(batch_size).cloned().collect();
        let mut stats = FlushStats::default();

        for mut item in batch {
            stats.processed += 1;
            let request = item.to_request();
            let outcome = self
                .executor
                .send(self.transport.as_ref(), &request, None)
                .await;

            let mut items = self.lock();
            // Cleared while in flight
            let Some(position) = items.iter().position(|queued| queued.id == item.id) else {
                continue;
            };
            items.remove(position);

            match outcome {
                Ok(_) => {
                    stats.successful += 1;
                    log::debug!("Replayed queued mutation {}", item.id);
                }
                Err(e) => {
                    stats.failed += 1;
                    item.attempts += 1;

                    if item.attempts >= self.config.max_attempts {
                        log::warn!(
                            "Dropping queued mutation {} after {} attempts: {}",
                            item.id,
                            item.attempts,
                            e
                        );
                        stats.exhausted.push(item);
                    } else {
                        log::debug!(
                            "Queued mutation {} failed (attempt {}): {}",
                            item.id,
                            item.attempts,
                            e
                        );
                        items.push_back(item);
                    }
                }
            }
        }

        if stats.processed > 0 {
            self.persist_or_warn().await;
        }

        stats.remaining = self.len();
        if stats.processed > 0 {
            log::info!(
                "Sync queue flush: {} processed, {} successful, {} failed, {} remaining",
                stats.processed,
                stats.successful,
                stats.failed,
                stats.remaining
            );
        }
        stats
    }

    /// Returns a copy of the queued items, oldest first
    pub fn pending(&self) -> Vec<SyncQueueItem> {
        self.lock().iter().cloned().collect()
    }

    /// Returns the number of queued items
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if nothing is queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every queued item, returning how many were removed
    pub async fn clear(&self) -> usize {
        let removed = {
            let mut items = self.lock();
            let removed = items.len();
            items.clear();
            removed
        };

        self.persist_or_warn().await;
        log::info!("Cleared {} queued mutations", removed);
        removed
    }

    /// Writes the current queue to the store
    async fn persist(&self) -> SyncResult<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };

        let _guard = self.persist_lock.lock().await;
        let entry = CacheEntry::new(
            self.pending(),
            self.clock.now(),
            None,
            self.config.schema_version.as_str(),
        );
        let raw = entry.encode().map_err(tradecost_cache::CacheError::from)?;
        store.set(&self.config.storage_key(), raw).await?;
        Ok(())
    }

    async fn persist_or_warn(&self) {
        if let Err(e) = self.persist().await {
            log::warn!("Failed to persist sync queue: {}", e);
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<SyncQueueItem>> {
        self.items.lock().unwrap_or_else(|poisoned| {
            log::warn!("Sync queue lock poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;
    use tradecost_cache::MemoryStore;
    use tradecost_core::{Method, Request, RequestError};
    use tradecost_resilience::RetryPolicy;

    struct AlwaysOk;

    #[async_trait]
    impl Transport for AlwaysOk {
        async fn send(&self, _request: &Request) -> Result<Value, RequestError> {
            Ok(Value::Null)
        }
    }

    fn queue(online: bool) -> SyncQueue {
        SyncQueue::new(
            SyncQueueConfig::default(),
            Arc::new(AlwaysOk),
            Connectivity::new(online),
        )
        .with_executor(RequestExecutor::new(RetryPolicy::new(0)))
    }

    fn post(path: &str) -> MutationRequest {
        MutationRequest::new("orders", path, Method::Post)
    }

    #[tokio::test]
    async fn test_enqueue_rejects_reads() {
        let queue = queue(true);
        let result = queue
            .enqueue(MutationRequest::new("orders", "/orders", Method::Get))
            .await;
        assert!(matches!(result, Err(SyncError::NotMutating(Method::Get))));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_flush_in_fifo_batches() {
        let queue = queue(true);
        for i in 0..7 {
            queue.enqueue(post(&format!("/orders/{}", i))).await.unwrap();
        }

        let stats = queue.flush(None).await;
        assert_eq!(stats.processed, 5);
        assert_eq!(stats.successful, 5);
        assert_eq!(stats.remaining, 2);

        let paths: Vec<String> = queue.pending().into_iter().map(|item| item.path).collect();
        assert_eq!(paths, vec!["/orders/5", "/orders/6"]);
    }

    #[tokio::test]
    async fn test_offline_flush_is_noop() {
        let queue = queue(false);
        queue.enqueue(post("/orders")).await.unwrap();

        assert_eq!(queue.flush(Some(10)).await, FlushStats::skipped(1));
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_clear() {
        let queue = queue(false);
        queue.enqueue(post("/a")).await.unwrap();
        queue.enqueue(post("/b")).await.unwrap();

        assert_eq!(queue.clear().await, 2);
        assert!(queue.pending().is_empty());
    }

    #[tokio::test]
    async fn test_persisted_record_layout() {
        let store = Arc::new(MemoryStore::new());
        let queue = queue(false).with_store(store.clone());
        queue.enqueue(post("/orders")).await.unwrap();

        let raw = store.get("tradecost/sync-queue").await.unwrap().unwrap();
        let record: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(record["schemaVersion"], "1");
        assert_eq!(record["value"][0]["path"], "/orders");
        assert!(record.get("storedAt").is_some());
        assert!(record.get("expiresAt").is_none());
    }

    #[tokio::test]
    async fn test_load_discards_other_schema_versions() {
        let store = Arc::new(MemoryStore::new());
        queue(false)
            .with_store(store.clone())
            .enqueue(post("/orders"))
            .await
            .unwrap();

        let config = SyncQueueConfig {
            schema_version: "2".to_string(),
            ..SyncQueueConfig::default()
        };
        let upgraded = SyncQueue::new(config, Arc::new(AlwaysOk), Connectivity::default())
            .with_store(store.clone());

        assert_eq!(upgraded.load().await.unwrap(), 0);
        assert!(upgraded.is_empty());
        assert_eq!(store.get("tradecost/sync-queue").await.unwrap(), None);
    }
}
