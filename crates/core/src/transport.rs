//! Transport capability used by the executor and sync queue

use crate::error::RequestError;
use crate::types::Request;
use async_trait::async_trait;

/// Sends one request to its endpoint and returns the decoded JSON body
///
/// Implementations classify failures into `RequestError` variants; they
/// must not retry on their own.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs a single attempt of `request`
    async fn send(&self, request: &Request) -> Result<serde_json::Value, RequestError>;
}
