//! Per-endpoint circuit breaker
//!
//! # State transitions
//! ```text
//! Closed   → Open:     failure_count reaches failure_threshold
//! Open     → HalfOpen: first admission once now >= next_attempt_at
//! HalfOpen → Closed:   trial call succeeds
//! HalfOpen → Open:     trial call fails (fresh half_open_timeout window)
//! ```
//!
//! Every transition runs inside one synchronous critical section, so a
//! read-modify-write on a record can never interleave with another task.

use crate::error::{ResilienceError, ResilienceResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tradecost_core::{Clock, EndpointId, SystemClock, Timestamp};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CircuitState {
    /// Circuit is closed, requests flow normally
    Closed,
    /// Circuit is open, requests are rejected
    Open,
    /// Circuit is half-open, one trial request tests recovery
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    failure_threshold: u32,
    /// Time an open circuit waits before admitting a trial
    half_open_timeout: Duration,
}

impl CircuitBreakerConfig {
    /// Creates a new configuration
    pub fn new(failure_threshold: u32, half_open_timeout: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            half_open_timeout,
        }
    }

    /// Returns the failure threshold
    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    /// Returns the half-open timeout
    pub fn half_open_timeout(&self) -> Duration {
        self.half_open_timeout
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(30))
    }
}

/// Health record for one endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitRecord {
    pub endpoint: EndpointId,
    pub status: CircuitState,
    pub failure_count: u32,
    pub last_failure_at: Option<Timestamp>,
    /// When an open circuit admits its trial, or when an unresolved trial
    /// is abandoned and another one admitted
    pub next_attempt_at: Option<Timestamp>,
    #[serde(default)]
    pub trial_in_flight: bool,
}

impl CircuitRecord {
    fn closed(endpoint: EndpointId) -> Self {
        Self {
            endpoint,
            status: CircuitState::Closed,
            failure_count: 0,
            last_failure_at: None,
            next_attempt_at: None,
            trial_in_flight: false,
        }
    }
}

/// Admission decision for one call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Circuit closed; call normally
    Proceed,
    /// The single half-open trial call
    ProceedAsTrial,
    /// Short-circuited; no call before `retry_at`
    Reject { retry_at: Timestamp },
}

impl Admission {
    /// Returns true unless the call was rejected
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Admission::Reject { .. })
    }
}

/// Circuit breakers for every endpoint, created lazily on first failure
#[derive(Debug, Clone)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    records: Arc<Mutex<HashMap<EndpointId, CircuitRecord>>>,
}

impl CircuitBreakerRegistry {
    /// Creates an empty registry
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            records: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Sets the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the configuration
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Decides whether a call to `endpoint` may proceed
    ///
    /// Must be checked before every call. An admitted trial must be followed
    /// by `record_success` or `record_failure`.
    pub fn admit(&self, endpoint: &EndpointId) -> Admission {
        let now = self.clock.now();
        let timeout = self.config.half_open_timeout;
        let mut records = self.lock();

        let Some(record) = records.get_mut(endpoint) else {
            return Admission::Proceed;
        };

        match record.status {
            CircuitState::Closed => Admission::Proceed,
            CircuitState::Open => {
                let next_attempt_at = record.next_attempt_at.unwrap_or(now);
                if now >= next_attempt_at {
                    record.status = CircuitState::HalfOpen;
                    record.trial_in_flight = true;
                    record.next_attempt_at = Some(now.saturating_add(timeout));
                    log::info!("Circuit for '{}' half-open, admitting trial", endpoint);
                    Admission::ProceedAsTrial
                } else {
                    Admission::Reject {
                        retry_at: next_attempt_at,
                    }
                }
            }
            CircuitState::HalfOpen => {
                let deadline = record.next_attempt_at.unwrap_or(now);
                if record.trial_in_flight && now < deadline {
                    Admission::Reject { retry_at: deadline }
                } else {
                    if record.trial_in_flight {
                        log::warn!("Trial for '{}' never resolved, admitting another", endpoint);
                    }
                    record.trial_in_flight = true;
                    record.next_attempt_at = Some(now.saturating_add(timeout));
                    Admission::ProceedAsTrial
                }
            }
        }
    }

    /// Like `admit`, but a rejection is an error
    pub fn check(&self, endpoint: &EndpointId) -> ResilienceResult<Admission> {
        match self.admit(endpoint) {
            Admission::Reject { retry_at } => Err(ResilienceError::CircuitOpen {
                endpoint: endpoint.to_string(),
                retry_at,
            }),
            admission => Ok(admission),
        }
    }

    /// Records a successful call
    ///
    /// Resets the failure count and closes a half-open circuit. A success
    /// reported while open (from a call admitted before the circuit opened)
    /// is ignored.
    pub fn record_success(&self, endpoint: &EndpointId) {
        let mut records = self.lock();
        let Some(record) = records.get_mut(endpoint) else {
            return;
        };

        match record.status {
            CircuitState::Closed => record.failure_count = 0,
            CircuitState::HalfOpen => {
                record.status = CircuitState::Closed;
                record.failure_count = 0;
                record.trial_in_flight = false;
                record.next_attempt_at = None;
                log::info!("Circuit for '{}' closed after successful trial", endpoint);
            }
            CircuitState::Open => {
                log::debug!("Ignoring late success for open circuit '{}'", endpoint);
            }
        }
    }

    /// Records a failed call, opening the circuit once the threshold is reached
    pub fn record_failure(&self, endpoint: &EndpointId) {
        let now = self.clock.now();
        let next_attempt_at = now.saturating_add(self.config.half_open_timeout);
        let mut records = self.lock();

        let record = records
            .entry(endpoint.clone())
            .or_insert_with(|| CircuitRecord::closed(endpoint.clone()));
        record.failure_count = record.failure_count.saturating_add(1);
        record.last_failure_at = Some(now);

        match record.status {
            CircuitState::Closed => {
                if record.failure_count >= self.config.failure_threshold {
                    record.status = CircuitState::Open;
                    record.next_attempt_at = Some(next_attempt_at);
                    log::warn!(
                        "Circuit for '{}' opened after {} consecutive failures",
                        endpoint,
                        record.failure_count
                    );
                }
            }
            CircuitState::HalfOpen => {
                record.status = CircuitState::Open;
                record.trial_in_flight = false;
                record.next_attempt_at = Some(next_attempt_at);
                log::warn!("Trial for '{}' failed, circuit reopened", endpoint);
            }
            CircuitState::Open => {
                record.next_attempt_at = Some(next_attempt_at);
            }
        }
    }

    /// Returns the state of `endpoint`; unknown endpoints are closed
    pub fn status(&self, endpoint: &EndpointId) -> CircuitState {
        self.lock()
            .get(endpoint)
            .map(|record| record.status)
            .unwrap_or(CircuitState::Closed)
    }

    /// Returns a copy of the record for `endpoint`
    pub fn record(&self, endpoint: &EndpointId) -> Option<CircuitRecord> {
        self.lock().get(endpoint).cloned()
    }

    /// Returns the state of every known endpoint
    pub fn statuses(&self) -> BTreeMap<EndpointId, CircuitState> {
        self.lock()
            .iter()
            .map(|(endpoint, record)| (endpoint.clone(), record.status))
            .collect()
    }

    /// Forces `endpoint` closed with a zero failure count
    pub fn reset(&self, endpoint: &EndpointId) {
        if let Some(record) = self.lock().get_mut(endpoint) {
            record.status = CircuitState::Closed;
            record.failure_count = 0;
            record.trial_in_flight = false;
            record.next_attempt_at = None;
            log::info!("Circuit for '{}' reset", endpoint);
        }
    }

    /// Returns every record, ordered by endpoint
    pub fn snapshot(&self) -> Vec<CircuitRecord> {
        let mut records: Vec<CircuitRecord> = self.lock().values().cloned().collect();
        records.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        records
    }

    /// Replaces every record
    ///
    /// Trials in flight belonged to a previous process and can never
    /// resolve, so they are cleared.
    pub fn restore(&self, records: Vec<CircuitRecord>) {
        let restored: HashMap<EndpointId, CircuitRecord> = records
            .into_iter()
            .map(|mut record| {
                record.trial_in_flight = false;
                (record.endpoint.clone(), record)
            })
            .collect();

        log::debug!("Restored {} circuit records", restored.len());
        *self.lock() = restored;
    }

    // A panic can't happen inside the critical sections above; recover the
    // map rather than failing every later call if one ever does.
    fn lock(&self) -> MutexGuard<'_, HashMap<EndpointId, CircuitRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| {
            log::warn!("Circuit registry lock poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
