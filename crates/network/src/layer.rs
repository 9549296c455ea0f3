//! Data layer lifecycle
//!
//! `DataLayer::init` opens the storage tiers under the configured data
//! directory, restores circuit and queue state, and starts the background
//! tasks. `dispose` persists circuit state and stops them.

use crate::client::HttpTransport;
use crate::connectivity::{ConnectivityChecker, MonitorHandle};
use crate::error::NetworkResult;
use crate::facade::ResilientClient;
use std::ops::Deref;
use std::sync::Arc;
use tradecost_cache::{
    CacheEntry, FileStore, KeyValueStore, MemoryStore, SqliteStore, TierKind, TieredCache,
};
use tradecost_config::{Config, ConfigError};
use tradecost_core::{Connectivity, Timestamp, Transport};
use tradecost_resilience::{CircuitBreakerRegistry, CircuitRecord, RequestExecutor};
use tradecost_sync_engine::{spawn_flusher, FlusherHandle, SyncQueue};

/// File name of the Local tier inside the data directory
pub const LOCAL_STORE_FILE: &str = "local.json";

/// File name of the Bulk tier inside the data directory
pub const BULK_STORE_FILE: &str = "bulk.db";

/// File name of the sync queue and circuit records
///
/// Kept apart from the Local tier so cache write-throughs can never use up
/// the quota these records need.
pub const STATE_STORE_FILE: &str = "state.json";

/// Everything a caller needs, wired from one `Config`
///
/// Dereferences to the `ResilientClient`.
pub struct DataLayer {
    client: ResilientClient,
    state: Arc<FileStore>,
    bulk: Arc<SqliteStore>,
    namespace: String,
    schema_version: String,
    flusher: FlusherHandle,
    monitor: Option<MonitorHandle>,
}

impl DataLayer {
    /// Builds the layer with an HTTP transport
    pub async fn init(config: &Config) -> NetworkResult<Self> {
        let transport = Arc::new(HttpTransport::from_config(&config.network)?);
        let connectivity = Connectivity::default();
        let mut layer = Self::with_transport(config, transport, connectivity.clone()).await?;

        if !config.network.connectivity_urls.is_empty() {
            let checker = ConnectivityChecker::from_config(&config.network, connectivity)?;
            layer.monitor = Some(checker.spawn(config.network.connectivity_interval()));
        }

        Ok(layer)
    }

    /// Builds the layer over any transport and connectivity signal
    pub async fn with_transport(
        config: &Config,
        transport: Arc<dyn Transport>,
        connectivity: Connectivity,
    ) -> NetworkResult<Self> {
        config.validate().map_err(ConfigError::Invalid)?;

        let data_dir = config.cache.resolve_data_dir()?;
        tokio::fs::create_dir_all(&data_dir).await?;
        log::info!("Opening data layer in {}", data_dir.display());

        let memory = Arc::new(MemoryStore::with_capacity(config.cache.memory_capacity));
        let local = Arc::new(FileStore::with_quota(
            data_dir.join(LOCAL_STORE_FILE),
            config.cache.local_quota_bytes,
        )?);
        let bulk = Arc::new(SqliteStore::open(data_dir.join(BULK_STORE_FILE)).await?);
        let state = Arc::new(FileStore::with_quota(
            data_dir.join(STATE_STORE_FILE),
            config.cache.local_quota_bytes,
        )?);

        let cache = Arc::new(
            TieredCache::new(&config.cache.namespace, &config.cache.schema_version)
                .with_tier(TierKind::Memory, memory)
                .with_tier(TierKind::Local, local)
                .with_tier(TierKind::Bulk, bulk.clone()),
        );

        let executor = RequestExecutor::new(config.retry.to_policy());
        let queue = Arc::new(
            SyncQueue::new(
                config.sync.to_queue_config(&config.cache),
                transport.clone(),
                connectivity,
            )
            .with_store(state.clone())
            .with_executor(executor),
        );
        queue.load().await?;

        let breakers = CircuitBreakerRegistry::new(config.circuit.to_breaker_config());
        let state_key = circuits_key(&config.cache.namespace);
        match state.get(&state_key).await {
            Ok(Some(raw)) => {
                match CacheEntry::<Vec<CircuitRecord>>::decode_current(
                    &raw,
                    &config.cache.schema_version,
                ) {
                    Some(entry) => breakers.restore(entry.value),
                    None => {
                        if let Err(e) = state.delete(&state_key).await {
                            log::warn!("Could not delete outdated circuit state: {}", e);
                        }
                    }
                }
            }
            Ok(None) => {}
            Err(e) => log::warn!("Could not read circuit state: {}", e),
        }

        let flusher = spawn_flusher(queue.clone(), config.sync.flush_interval());

        let client = ResilientClient::new(transport, cache, queue)
            .with_breakers(breakers)
            .with_executor(executor)
            .with_default_ttl(Some(config.cache.default_ttl()));

        Ok(Self {
            client,
            state,
            bulk,
            namespace: config.cache.namespace.clone(),
            schema_version: config.cache.schema_version.clone(),
            flusher,
            monitor: None,
        })
    }

    /// Returns the facade
    pub fn client(&self) -> &ResilientClient {
        &self.client
    }

    /// Writes the circuit breaker records to the state store
    pub async fn persist_circuits(&self) {
        save_circuits(
            self.client.breakers(),
            self.state.as_ref(),
            &self.namespace,
            &self.schema_version,
        )
        .await;
    }

    /// Stops background tasks, persists circuit state and closes storage
    pub async fn dispose(self) {
        let Self {
            client,
            state,
            bulk,
            namespace,
            schema_version,
            flusher,
            monitor,
        } = self;

        if let Some(monitor) = monitor {
            monitor.stop().await;
        }
        flusher.stop().await;

        save_circuits(client.breakers(), state.as_ref(), &namespace, &schema_version).await;
        bulk.close().await;
        log::info!("Data layer disposed");
    }
}

impl Deref for DataLayer {
    type Target = ResilientClient;

    fn deref(&self) -> &ResilientClient {
        &self.client
    }
}

async fn save_circuits(
    breakers: &CircuitBreakerRegistry,
    store: &dyn KeyValueStore,
    namespace: &str,
    schema_version: &str,
) {
    let entry = CacheEntry::new(breakers.snapshot(), Timestamp::now(), None, schema_version);
    let raw = match entry.encode() {
        Ok(raw) => raw,
        Err(e) => {
            log::warn!("Could not encode circuit state: {}", e);
            return;
        }
    };

    match store.set(&circuits_key(namespace), raw).await {
        Ok(()) => log::debug!("Persisted {} circuit records", entry.value.len()),
        Err(e) => log::warn!("Could not persist circuit state: {}", e),
    }
}

/// Key of the persisted circuit breaker records
pub fn circuits_key(namespace: &str) -> String {
    format!("{}/circuits", namespace)
}
