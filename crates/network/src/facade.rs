//! Resilient request facade
//!
//! Every call goes through the same pipeline: circuit admission, cache,
//! retrying executor, then the degraded paths (cached data, fallback
//! envelope, or the offline queue for mutations). Callers always get a
//! `ResponseEnvelope`; nothing on this path returns an error or panics.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tradecost_cache::{CacheResult, Lookup, SetOptions, TieredCache};
use tradecost_core::{
    Connectivity, EndpointId, Method, Request, RequestError, ResponseEnvelope, Transport,
};
use tradecost_resilience::{
    Admission, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState, RequestExecutor,
};
use tradecost_sync_engine::{FlushStats, MutationRequest, SyncQueue, SyncResult};

/// Per-call options for `resilient_request`
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    pub method: Method,
    pub params: BTreeMap<String, String>,
    pub body: Option<Value>,
    /// Read from and write through to the cache
    pub use_cache: bool,
    /// TTL for the write-through; the client default when unset
    pub cache_ttl: Option<Duration>,
    /// Skip circuit admission (outcomes are still recorded)
    pub bypass_circuit_breaker: bool,
    /// Serve cached data, even stale, when the call fails
    pub fallback_to_cache: bool,
    /// Overrides the executor's retry count
    pub retries: Option<u32>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::Get,
            params: BTreeMap::new(),
            body: None,
            use_cache: true,
            cache_ttl: None,
            bypass_circuit_breaker: false,
            fallback_to_cache: true,
            retries: None,
        }
    }
}

impl RequestOptions {
    /// Options for a cached read
    pub fn get() -> Self {
        Self::default()
    }

    /// Options for a state-changing call
    pub fn mutation(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn no_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    pub fn no_fallback(mut self) -> Self {
        self.fallback_to_cache = false;
        self
    }

    pub fn bypass_circuit_breaker(mut self) -> Self {
        self.bypass_circuit_breaker = true;
        self
    }
}

/// Orchestrates cache, circuit breakers, retries and the sync queue
#[derive(Clone)]
pub struct ResilientClient {
    transport: Arc<dyn Transport>,
    cache: Arc<TieredCache>,
    breakers: CircuitBreakerRegistry,
    executor: RequestExecutor,
    queue: Arc<SyncQueue>,
    default_ttl: Option<Duration>,
}

impl ResilientClient {
    /// Creates a client with default breaker and retry settings
    pub fn new(transport: Arc<dyn Transport>, cache: Arc<TieredCache>, queue: Arc<SyncQueue>) -> Self {
        Self {
            transport,
            cache,
            breakers: CircuitBreakerRegistry::new(CircuitBreakerConfig::default()),
            executor: RequestExecutor::default(),
            queue,
            default_ttl: None,
        }
    }

    /// Uses `breakers` for admission
    pub fn with_breakers(mut self, breakers: CircuitBreakerRegistry) -> Self {
        self.breakers = breakers;
        self
    }

    /// Uses `executor` for live calls
    pub fn with_executor(mut self, executor: RequestExecutor) -> Self {
        self.executor = executor;
        self
    }

    /// TTL for write-throughs that don't specify one
    pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn cache(&self) -> &Arc<TieredCache> {
        &self.cache
    }

    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }

    pub fn queue(&self) -> &Arc<SyncQueue> {
        &self.queue
    }

    pub fn connectivity(&self) -> &Connectivity {
        self.queue.connectivity()
    }

    /// Performs one logical call against `endpoint`
    ///
    /// Reads may be served from cache; mutations that cannot be applied
    /// now are queued for replay.
    pub async fn resilient_request<T>(
        &self,
        endpoint: impl Into<EndpointId>,
        path: impl Into<String>,
        options: RequestOptions,
    ) -> ResponseEnvelope<T>
    where
        T: DeserializeOwned,
    {
        let request = Request {
            endpoint: endpoint.into(),
            path: path.into(),
            method: options.method,
            params: options.params.clone(),
            body: options.body.clone(),
        };

        if request.method.is_mutating() {
            self.mutate(request, &options).await
        } else {
            self.read(request, &options).await
        }
    }

    async fn read<T: DeserializeOwned>(
        &self,
        request: Request,
        options: &RequestOptions,
    ) -> ResponseEnvelope<T> {
        let key = request.cache_key();
        let mut stale = None;

        // A fresh hit never needs the network, so it is served before
        // admission and can't consume a half-open trial. An expired copy is
        // purged by the lookup, so it is kept here for the degraded path.
        if options.use_cache {
            match self.cache.lookup(&key).await {
                Lookup::Fresh(entry) => match serde_json::from_value(entry.value) {
                    Ok(value) => return ResponseEnvelope::cached(value),
                    Err(e) => log::warn!("Cached value for {} has an unexpected shape: {}", key, e),
                },
                Lookup::Stale(entry) => stale = Some(entry.value),
                Lookup::Miss => {}
            }
        }

        if !options.bypass_circuit_breaker {
            if let Admission::Reject { retry_at } = self.breakers.admit(&request.endpoint) {
                log::debug!(
                    "Circuit open for '{}' until {}, skipping network",
                    request.endpoint,
                    retry_at
                );
                // Nothing was attempted, so `fallback_to_cache` does not apply
                let error = RequestError::unavailable(&request.endpoint);
                return self.serve_cached(&key, stale, error).await;
            }
        }

        let value = match self.call(&request, options).await {
            Ok(value) => value,
            Err(error) => return self.degrade(&key, stale, error, options).await,
        };

        let decoded = match serde_json::from_value::<T>(value.clone()) {
            Ok(decoded) => decoded,
            Err(e) => {
                let error = RequestError::invalid_response(e.to_string());
                log::warn!("Response for {} could not be decoded: {}", key, e);
                return self.degrade(&key, stale, error, options).await;
            }
        };

        if options.use_cache {
            let ttl = options.cache_ttl.or(self.default_ttl);
            let set_options = SetOptions {
                ttl,
                ..SetOptions::default()
            };
            if let Err(e) = self.cache.set(&key, &value, set_options).await {
                log::warn!("Write-through for {} failed: {}", key, e);
            }
        }

        ResponseEnvelope::live(decoded)
    }

    async fn mutate<T: DeserializeOwned>(
        &self,
        request: Request,
        options: &RequestOptions,
    ) -> ResponseEnvelope<T> {
        if !self.connectivity().is_online() {
            return self.enqueue_failed(request, RequestError::Offline).await;
        }

        if !options.bypass_circuit_breaker {
            if let Err(rejected) = self.breakers.check(&request.endpoint) {
                return self.enqueue_failed(request, rejected.into()).await;
            }
        }

        match self.call(&request, options).await {
            Ok(value) => match serde_json::from_value::<T>(value) {
                Ok(decoded) => ResponseEnvelope::live(decoded),
                Err(e) => ResponseEnvelope::failed(RequestError::invalid_response(e.to_string())),
            },
            Err(error) if error.is_terminal() => {
                log::warn!(
                    "{} {}:{} rejected: {}",
                    request.method,
                    request.endpoint,
                    request.path,
                    error
                );
                ResponseEnvelope::failed(error)
            }
            Err(error) => self.enqueue_failed(request, error).await,
        }
    }

    /// Executes with retries and reports the outcome to the breaker
    async fn call(&self, request: &Request, options: &RequestOptions) -> Result<Value, RequestError> {
        let result = self
            .executor
            .send(self.transport.as_ref(), request, options.retries)
            .await;

        match result {
            Ok(_) => self.breakers.record_success(&request.endpoint),
            Err(_) => self.breakers.record_failure(&request.endpoint),
        }
        result
    }

    /// Handles a failed live call: cached data if allowed, else the raw error
    async fn degrade<T: DeserializeOwned>(
        &self,
        key: &str,
        stale: Option<Value>,
        error: RequestError,
        options: &RequestOptions,
    ) -> ResponseEnvelope<T> {
        if !options.fallback_to_cache {
            return ResponseEnvelope::failed(error);
        }
        self.serve_cached(key, stale, error).await
    }

    /// Serves cached data (fresh or stale) if there is any, else a fallback envelope
    async fn serve_cached<T: DeserializeOwned>(
        &self,
        key: &str,
        stale: Option<Value>,
        error: RequestError,
    ) -> ResponseEnvelope<T> {
        let cached = match stale {
            Some(value) => Some(value),
            None => self.cache.lookup(key).await.any(),
        };

        if let Some(value) = cached {
            match serde_json::from_value(value) {
                Ok(value) => {
                    log::info!("Serving cached {} after: {}", key, error);
                    return ResponseEnvelope::cached(value);
                }
                Err(e) => log::warn!("Cached value for {} has an unexpected shape: {}", key, e),
            }
        }

        ResponseEnvelope::fallback(error)
    }

    async fn enqueue_failed<T>(&self, request: Request, error: RequestError) -> ResponseEnvelope<T> {
        match self.queue.enqueue(MutationRequest::from(request)).await {
            Ok(id) => ResponseEnvelope::queued(id, error),
            Err(e) => {
                log::error!("Could not queue mutation: {}", e);
                ResponseEnvelope::failed(error)
            }
        }
    }

    /// Fresh cached value for `key`
    pub async fn cache_get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.cache.get(key).await
    }

    /// Writes `value` under `key`
    pub async fn cache_set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        options: SetOptions,
    ) -> CacheResult<()> {
        self.cache.set(key, value, options).await
    }

    /// Clears the cache namespace, or the keys under `prefix`
    pub async fn cache_clear(&self, prefix: Option<&str>) -> usize {
        self.cache.clear(prefix).await
    }

    /// Queues a mutation for later replay
    pub async fn enqueue_mutation(&self, mutation: MutationRequest) -> SyncResult<String> {
        self.queue.enqueue(mutation).await
    }

    /// Replays queued mutations now
    pub async fn flush_queue(&self, batch_size: Option<usize>) -> FlushStats {
        self.queue.flush(batch_size).await
    }

    /// State of every endpoint the breaker has seen
    pub fn circuit_status(&self) -> BTreeMap<EndpointId, CircuitState> {
        self.breakers.statuses()
    }

    /// Forces the circuit for `endpoint` closed
    pub fn circuit_reset(&self, endpoint: &EndpointId) {
        self.breakers.reset(endpoint)
    }
}
