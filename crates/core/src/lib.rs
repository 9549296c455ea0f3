//! Shared types for the TradeCost data layer
//!
//! Requests, response envelopes, the request error taxonomy, the
//! `Transport` capability, the connectivity signal and the clock
//! abstraction used by every other crate in the workspace.

pub mod connectivity;
pub mod error;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use connectivity::Connectivity;
pub use error::{ErrorSeverity, RecoveryAction, RequestError};
pub use transport::Transport;
pub use types::{
    Clock, EndpointId, ManualClock, Method, Origin, Request, ResponseEnvelope, SystemClock,
    Timestamp,
};
