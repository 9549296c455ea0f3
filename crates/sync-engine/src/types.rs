//! Queue item and flush report types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tradecost_core::{EndpointId, Method, Request, Timestamp};
use uuid::Uuid;

/// A state-changing call to replay later
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationRequest {
    pub endpoint: EndpointId,
    pub path: String,
    pub method: Method,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
}

impl MutationRequest {
    /// Creates a mutation with no body
    pub fn new(endpoint: impl Into<EndpointId>, path: impl Into<String>, method: Method) -> Self {
        Self {
            endpoint: endpoint.into(),
            path: path.into(),
            method,
            params: BTreeMap::new(),
            body: None,
        }
    }

    /// Sets the JSON body
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

impl From<Request> for MutationRequest {
    fn from(request: Request) -> Self {
        Self {
            endpoint: request.endpoint,
            path: request.path,
            method: request.method,
            params: request.params,
            body: request.body,
        }
    }
}

/// A queued mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueItem {
    /// Random UUID v4
    pub id: String,
    pub endpoint: EndpointId,
    pub path: String,
    pub method: Method,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
    pub enqueued_at: Timestamp,
    /// Flush attempts made so far
    pub attempts: u32,
}

impl SyncQueueItem {
    /// Creates an item with a fresh id and no attempts
    pub fn new(mutation: MutationRequest, now: Timestamp) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            endpoint: mutation.endpoint,
            path: mutation.path,
            method: mutation.method,
            params: mutation.params,
            body: mutation.body,
            enqueued_at: now,
            attempts: 0,
        }
    }

    /// Rebuilds the request this item replays
    pub fn to_request(&self) -> Request {
        Request {
            endpoint: self.endpoint.clone(),
            path: self.path.clone(),
            method: self.method,
            params: self.params.clone(),
            body: self.body.clone(),
        }
    }
}

/// Outcome of one flush
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlushStats {
    /// Items attempted
    pub processed: usize,
    /// Items applied and removed
    pub successful: usize,
    /// Every failed attempt in this flush
    ///
    /// Includes the items listed in `exhausted`, so `processed` is always
    /// `successful + failed`. Do not add `exhausted.len()` on top.
    pub failed: usize,
    /// Items left in the queue afterwards
    pub remaining: usize,
    /// The subset of `failed` dropped after reaching the attempt limit
    pub exhausted: Vec<SyncQueueItem>,
}

impl FlushStats {
    /// Failed items that stay queued for the next flush
    pub fn requeued(&self) -> usize {
        self.failed - self.exhausted.len()
    }

    /// Stats for a flush that did not run
    pub fn skipped(remaining: usize) -> Self {
        Self {
            remaining,
            ..Self::default()
        }
    }
}
