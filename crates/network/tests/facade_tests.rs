//! Scenario tests for the resilient request facade

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::assert_ok;
use tradecost_cache::{MemoryStore, SetOptions, TierKind, TieredCache};
use tradecost_core::{
    Clock, Connectivity, EndpointId, ManualClock, Method, Origin, Request, RequestError,
    ResponseEnvelope, Timestamp, Transport,
};
use tradecost_network::{RequestOptions, ResilientClient};
use tradecost_resilience::{
    CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState, RequestExecutor, RetryPolicy,
};
use tradecost_sync_engine::{FlushStats, MutationRequest, SyncQueue, SyncQueueConfig};

/// Replays scripted outcomes, then answers with `fallback`
struct ScriptedTransport {
    outcomes: Mutex<VecDeque<Result<Value, RequestError>>>,
    fallback: Value,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    fn answering(value: Value) -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            fallback: value,
            calls: AtomicUsize::new(0),
        }
    }

    fn then_fail(&self, times: usize, error: RequestError) {
        let mut outcomes = self.outcomes.lock().unwrap();
        for _ in 0..times {
            outcomes.push_back(Err(error.clone()));
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, _request: &Request) -> Result<Value, RequestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

struct Harness {
    client: ResilientClient,
    transport: Arc<ScriptedTransport>,
    clock: ManualClock,
    connectivity: Connectivity,
}

fn harness(retries: u32) -> Harness {
    let _ = env_logger::builder().is_test(true).try_init();

    let transport = Arc::new(ScriptedTransport::answering(json!({"fee": 2.0})));
    let clock = ManualClock::new(Timestamp::from_millis(1_000_000));
    let connectivity = Connectivity::default();

    let cache = Arc::new(
        TieredCache::new("test", "1")
            .with_clock(Arc::new(clock.clone()))
            .with_tier(TierKind::Memory, Arc::new(MemoryStore::new())),
    );
    let breakers = CircuitBreakerRegistry::new(CircuitBreakerConfig::default())
        .with_clock(Arc::new(clock.clone()));
    let executor = RequestExecutor::new(RetryPolicy::new(retries));
    let queue = Arc::new(
        SyncQueue::new(
            SyncQueueConfig::default(),
            transport.clone(),
            connectivity.clone(),
        )
        .with_executor(RequestExecutor::new(RetryPolicy::new(0))),
    );

    let client = ResilientClient::new(transport.clone(), cache, queue)
        .with_breakers(breakers)
        .with_executor(executor);

    Harness {
        client,
        transport,
        clock,
        connectivity,
    }
}

async fn read(client: &ResilientClient, options: RequestOptions) -> ResponseEnvelope<Value> {
    client.resilient_request("fees", "/brokers", options).await
}

#[tokio::test]
async fn test_open_circuit_serves_cached_value() {
    let h = harness(0);

    let primed = read(&h.client, RequestOptions::get()).await;
    assert_eq!(primed.source, Origin::Live);

    // Live attempts fail and fall back to the cached copy
    h.transport.then_fail(5, RequestError::server(503, "down"));
    for _ in 0..5 {
        let envelope = read(&h.client, RequestOptions::get().no_cache()).await;
        assert_eq!(envelope.source, Origin::Cache);
        assert_eq!(envelope.value, Some(json!({"fee": 2.0})));
    }

    let endpoint = EndpointId::new("fees");
    assert_eq!(h.client.circuit_status()[&endpoint], CircuitState::Open);
    let record = h.client.breakers().record(&endpoint).unwrap();
    assert_eq!(
        record.next_attempt_at,
        Some(h.clock.now().saturating_add(Duration::from_secs(30)))
    );

    // Rejected without touching the network
    let calls = h.transport.calls();
    let envelope = read(&h.client, RequestOptions::get().no_cache()).await;
    assert_eq!(envelope.source, Origin::Cache);
    assert_eq!(envelope.value, Some(json!({"fee": 2.0})));
    assert_eq!(h.transport.calls(), calls);
}

#[tokio::test]
async fn test_failed_read_serves_stale_copy_once() {
    let h = harness(0);

    let primed = read(&h.client, RequestOptions::get().with_ttl(Duration::from_secs(1))).await;
    assert_eq!(primed.source, Origin::Live);
    h.clock.advance(Duration::from_secs(2));

    h.transport.then_fail(2, RequestError::network("reset"));
    let envelope = read(&h.client, RequestOptions::get()).await;
    assert_eq!(envelope.source, Origin::Cache);
    assert_eq!(envelope.value, Some(json!({"fee": 2.0})));

    // The expired copy was purged by the lookup that found it
    let envelope = read(&h.client, RequestOptions::get()).await;
    assert_eq!(envelope.source, Origin::Fallback);
    assert_eq!(envelope.error, Some(RequestError::network("reset")));
}

#[tokio::test]
async fn test_open_circuit_without_cache_is_fallback() {
    let h = harness(0);
    h.transport.then_fail(5, RequestError::network("refused"));

    for _ in 0..5 {
        let envelope = read(&h.client, RequestOptions::get()).await;
        assert_eq!(envelope.source, Origin::Fallback);
        assert_eq!(envelope.error, Some(RequestError::network("refused")));
    }

    let envelope = read(&h.client, RequestOptions::get()).await;
    assert_eq!(envelope.source, Origin::Fallback);
    assert_eq!(envelope.error, Some(RequestError::unavailable("fees")));
    assert!(envelope.value.is_none());
}

#[tokio::test]
async fn test_rejected_read_is_fallback_even_without_fallback_to_cache() {
    let h = harness(0);
    h.transport.then_fail(5, RequestError::network("refused"));
    for _ in 0..5 {
        let _ = read(&h.client, RequestOptions::get().no_cache()).await;
    }
    assert_eq!(h.client.breakers().status(&EndpointId::new("fees")), CircuitState::Open);
    let calls = h.transport.calls();

    let envelope = read(&h.client, RequestOptions::get().no_cache().no_fallback()).await;
    assert_eq!(envelope.source, Origin::Fallback);
    assert_eq!(envelope.error, Some(RequestError::unavailable("fees")));
    assert!(envelope.value.is_none());
    assert_eq!(h.transport.calls(), calls);
}

#[tokio::test]
async fn test_rejected_read_serves_stale_copy_without_fallback_to_cache() {
    let h = harness(0);
    h.client
        .cache_set("fees:/brokers", &json!({"fee": 1.0}), SetOptions::with_ttl(Duration::from_millis(1)))
        .await
        .unwrap();
    h.clock.advance(Duration::from_secs(1));
    h.transport.then_fail(5, RequestError::network("refused"));
    for _ in 0..5 {
        let _ = read(&h.client, RequestOptions::get().no_cache()).await;
    }

    let envelope = read(&h.client, RequestOptions::get().no_fallback()).await;
    assert_eq!(envelope.source, Origin::Cache);
    assert_eq!(envelope.value, Some(json!({"fee": 1.0})));
}

#[tokio::test]
async fn test_no_fallback_returns_raw_error() {
    let h = harness(0);
    h.client
        .cache_set("fees:/brokers", &json!({"fee": 1.0}), SetOptions::with_ttl(Duration::from_millis(1)))
        .await
        .unwrap();
    h.clock.advance(Duration::from_secs(1));
    h.transport.then_fail(1, RequestError::server(500, "boom"));

    let envelope = read(&h.client, RequestOptions::get().no_fallback()).await;
    assert_eq!(envelope.source, Origin::Live);
    assert_eq!(envelope.error, Some(RequestError::server(500, "boom")));
}

#[tokio::test]
async fn test_use_cache_false_bypasses_lookup_and_write() {
    let h = harness(0);
    assert_ok!(
        h.client
            .cache_set("fees:/brokers", &json!({"fee": 9.9}), SetOptions::default())
            .await
    );

    let envelope = read(&h.client, RequestOptions::get().no_cache()).await;
    assert_eq!(envelope.source, Origin::Live);
    assert_eq!(envelope.value, Some(json!({"fee": 2.0})));
    assert_eq!(h.transport.calls(), 1);

    // The live value was not written through
    let cached: Option<Value> = h.client.cache_get("fees:/brokers").await;
    assert_eq!(cached, Some(json!({"fee": 9.9})));
}

#[tokio::test]
async fn test_fresh_hit_skips_network() {
    let h = harness(0);

    let first = read(&h.client, RequestOptions::get().with_param("broker", "ib")).await;
    let second = read(&h.client, RequestOptions::get().with_param("broker", "ib")).await;

    assert_eq!(first.source, Origin::Live);
    assert_eq!(second.source, Origin::Cache);
    assert_eq!(second.value, first.value);
    assert_eq!(h.transport.calls(), 1);

    let cached: Option<Value> = h.client.cache_get("fees:/brokers?broker=ib").await;
    assert!(cached.is_some());
}

#[tokio::test]
async fn test_half_open_trial_closes_circuit() {
    let h = harness(0);
    h.transport.then_fail(5, RequestError::server(502, "bad gateway"));
    for _ in 0..5 {
        read(&h.client, RequestOptions::get().no_cache()).await;
    }
    let endpoint = EndpointId::new("fees");
    assert_eq!(h.client.breakers().status(&endpoint), CircuitState::Open);

    h.clock.advance(Duration::from_secs(30));
    let envelope = read(&h.client, RequestOptions::get().no_cache()).await;

    assert_eq!(envelope.source, Origin::Live);
    assert_eq!(h.client.breakers().status(&endpoint), CircuitState::Closed);
    assert_eq!(h.client.breakers().record(&endpoint).unwrap().failure_count, 0);
}

#[tokio::test]
async fn test_bypass_circuit_breaker_still_records() {
    let h = harness(0);
    h.transport.then_fail(5, RequestError::timeout(Duration::from_secs(10)));
    for _ in 0..5 {
        read(&h.client, RequestOptions::get().no_cache()).await;
    }
    let endpoint = EndpointId::new("fees");
    let calls = h.transport.calls();

    let envelope = read(
        &h.client,
        RequestOptions::get().no_cache().bypass_circuit_breaker(),
    )
    .await;

    assert_eq!(envelope.source, Origin::Live);
    assert_eq!(h.transport.calls(), calls + 1);
    // A success while open does not close the circuit
    assert_eq!(h.client.breakers().status(&endpoint), CircuitState::Open);

    h.client.circuit_reset(&endpoint);
    assert_eq!(h.client.circuit_status()[&endpoint], CircuitState::Closed);
}

#[tokio::test]
async fn test_offline_mutation_is_queued() {
    let h = harness(0);
    h.connectivity.set_online(false);

    let envelope: ResponseEnvelope<Value> = h
        .client
        .resilient_request(
            "orders",
            "/orders",
            RequestOptions::mutation(Method::Post).with_body(json!({"qty": 10})),
        )
        .await;

    assert!(envelope.is_queued());
    assert_eq!(envelope.error, Some(RequestError::Offline));
    assert_eq!(h.transport.calls(), 0);

    let id = h
        .client
        .enqueue_mutation(MutationRequest::new("orders", "/orders/1", Method::Delete))
        .await
        .unwrap();
    assert_ne!(Some(id), envelope.queued_id);

    let stats = h.client.flush_queue(None).await;
    assert_eq!(
        stats,
        FlushStats {
            processed: 0,
            successful: 0,
            failed: 0,
            remaining: 2,
            exhausted: Vec::new(),
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_mutation_queued_after_retries_exhausted() {
    let h = harness(3);
    h.transport.then_fail(3, RequestError::server(503, "busy"));

    let envelope: ResponseEnvelope<Value> = h
        .client
        .resilient_request(
            "orders",
            "/orders",
            RequestOptions::mutation(Method::Put)
                .with_body(json!({"qty": 1}))
                .with_retries(2),
        )
        .await;

    assert!(envelope.is_queued());
    assert_eq!(envelope.error, Some(RequestError::server(503, "busy")));
    assert_eq!(h.transport.calls(), 3);

    let pending = h.client.queue().pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].method, Method::Put);
    assert_eq!(pending[0].body, Some(json!({"qty": 1})));

    let stats = h.client.flush_queue(None).await;
    assert_eq!(stats.successful, 1);
    assert!(h.client.queue().is_empty());
}

#[tokio::test]
async fn test_mutation_rejected_by_circuit_is_queued() {
    let h = harness(0);
    h.transport.then_fail(5, RequestError::server(500, "down"));
    for _ in 0..5 {
        h.client
            .resilient_request::<Value>("orders", "/orders", RequestOptions::mutation(Method::Post))
            .await;
    }
    assert_eq!(h.client.queue().len(), 5);
    let calls = h.transport.calls();

    let envelope: ResponseEnvelope<Value> = h
        .client
        .resilient_request("orders", "/orders", RequestOptions::mutation(Method::Post))
        .await;

    assert!(envelope.is_queued());
    assert!(matches!(
        envelope.error,
        Some(RequestError::CircuitOpen { ref endpoint }) if endpoint == "orders"
    ));
    assert_eq!(h.transport.calls(), calls);
}

#[tokio::test]
async fn test_client_errors_count_toward_circuit() {
    let h = harness(3);
    h.transport.then_fail(5, RequestError::client(404, "no such broker"));

    for _ in 0..5 {
        let envelope = read(&h.client, RequestOptions::get()).await;
        assert_eq!(envelope.error, Some(RequestError::client(404, "no such broker")));
    }

    // Attempted once each, never retried
    assert_eq!(h.transport.calls(), 5);
    assert_eq!(
        h.client.breakers().status(&EndpointId::new("fees")),
        CircuitState::Open
    );
}

#[tokio::test]
async fn test_cache_clear_by_prefix() {
    let h = harness(0);
    for key in ["fees:/a", "fees:/b", "fx:/usd"] {
        h.client
            .cache_set(key, &json!(1), SetOptions::default())
            .await
            .unwrap();
    }

    assert_eq!(h.client.cache_clear(Some("fees:")).await, 2);
    assert!(h.client.cache_get::<Value>("fees:/a").await.is_none());
    assert_eq!(h.client.cache_get::<Value>("fx:/usd").await, Some(json!(1)));
}
