//! Offline mutation queue
//!
//! State-changing requests that could not be applied (offline, endpoint
//! unhealthy, retries exhausted) are recorded durably and replayed later:
//! - on a periodic timer
//! - as soon as connectivity returns
//! - on demand via `SyncQueue::flush`
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tradecost_core::{Connectivity, Method, Transport};
//! use tradecost_sync_engine::{MutationRequest, SyncQueue, SyncQueueConfig};
//!
//! # async fn example(transport: Arc<dyn Transport>) {
//! let queue = SyncQueue::new(SyncQueueConfig::default(), transport, Connectivity::default());
//!
//! let id = queue
//!     .enqueue(MutationRequest::new("orders", "/orders", Method::Post))
//!     .await
//!     .unwrap();
//! let stats = queue.flush(None).await;
//! # }
//! ```

mod error;
mod flusher;
mod queue;
mod types;

pub use error::{SyncError, SyncResult};
pub use flusher::{spawn_flusher, FlusherHandle};
pub use queue::{SyncQueue, SyncQueueConfig};
pub use types::{FlushStats, MutationRequest, SyncQueueItem};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_exports_accessible() {
        // Verify all types are exported
        let _: SyncQueueConfig = SyncQueueConfig::default();
        let _: FlushStats = FlushStats::default();
        let mutation = MutationRequest::new("orders", "/orders", tradecost_core::Method::Post);
        let _: SyncQueueItem = SyncQueueItem::new(mutation, tradecost_core::Timestamp::now());
        let _: SyncResult<()> = Err(SyncError::NotMutating(tradecost_core::Method::Get));
    }
}
