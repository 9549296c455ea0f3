//! HTTP transport, connectivity probing and the resilient data layer
//!
//! - `HttpTransport`: one attempt per call over reqwest
//! - `ConnectivityChecker`: probes URLs and feeds the connectivity signal
//! - `ResilientClient`: cache, circuit breaker, retries and offline queue
//!   behind a single `resilient_request`
//! - `DataLayer`: builds all of the above from a `Config`

mod client;
mod connectivity;
mod error;
mod facade;
mod layer;

pub use client::{HttpTransport, HttpTransportConfig};
pub use connectivity::{ConnectivityChecker, MonitorHandle};
pub use error::{NetworkError, NetworkResult};
pub use facade::{RequestOptions, ResilientClient};
pub use layer::{circuits_key, DataLayer, BULK_STORE_FILE, LOCAL_STORE_FILE, STATE_STORE_FILE};
