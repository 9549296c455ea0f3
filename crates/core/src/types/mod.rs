//! Domain types for the data layer
//!
//! - `common`: timestamps and clocks
//! - `request`: endpoints, methods and request descriptions
//! - `envelope`: provenance-tagged responses

mod common;
mod envelope;
mod request;

pub use common::{Clock, ManualClock, SystemClock, Timestamp};
pub use envelope::{Origin, ResponseEnvelope};
pub use request::{EndpointId, Method, Request};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_types_are_exported() {
        let _endpoint: EndpointId = EndpointId::new("costs");
        let _request: Request = Request::get("costs", "/fees");
        let _clock: ManualClock = ManualClock::default();
        let _origin: Origin = Origin::Live;
    }
}
