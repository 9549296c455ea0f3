//! Response envelope returned by every facade call

use crate::error::RequestError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the value in an envelope came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Fresh result of a network call
    Live,
    /// Served from the tiered cache
    Cache,
    /// Degraded answer; no real data available
    Fallback,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Live => write!(f, "live"),
            Origin::Cache => write!(f, "cache"),
            Origin::Fallback => write!(f, "fallback"),
        }
    }
}

/// Result of one facade call, tagged with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope<T> {
    pub value: Option<T>,
    pub error: Option<RequestError>,
    pub source: Origin,
    /// Sync queue id when a mutation was queued instead of applied
    pub queued_id: Option<String>,
}

impl<T> ResponseEnvelope<T> {
    /// Value obtained from a live call
    pub fn live(value: T) -> Self {
        Self {
            value: Some(value),
            error: None,
            source: Origin::Live,
            queued_id: None,
        }
    }

    /// Value served from cache
    pub fn cached(value: T) -> Self {
        Self {
            value: Some(value),
            error: None,
            source: Origin::Cache,
            queued_id: None,
        }
    }

    /// Live call failed and no degraded path applied
    pub fn failed(error: RequestError) -> Self {
        Self {
            value: None,
            error: Some(error),
            source: Origin::Live,
            queued_id: None,
        }
    }

    /// Degraded answer carrying the reason
    pub fn fallback(error: RequestError) -> Self {
        Self {
            value: None,
            error: Some(error),
            source: Origin::Fallback,
            queued_id: None,
        }
    }

    /// Mutation was handed to the sync queue
    pub fn queued(id: impl Into<String>, error: RequestError) -> Self {
        Self {
            value: None,
            error: Some(error),
            source: Origin::Fallback,
            queued_id: Some(id.into()),
        }
    }

    /// Returns true if the envelope carries a value
    pub fn is_ok(&self) -> bool {
        self.value.is_some()
    }

    /// Returns true if the mutation was queued rather than applied
    pub fn is_queued(&self) -> bool {
        self.queued_id.is_some()
    }

    /// Converts the envelope into a `Result`, dropping provenance
    pub fn into_result(self) -> Result<Option<T>, RequestError> {
        match self.error {
            Some(error) if self.value.is_none() => Err(error),
            _ => Ok(self.value),
        }
    }
}
