//! The channel transport seam. Concrete HTTP/SOAP delivery lives outside
//! this crate (the host wires up a `reqwest`-based implementation); the
//! scheduler only depends on this trait, mirroring the teacher's
//! `QueuePublisher` seam between the poller and the concrete queue.

use async_trait::async_trait;
use htng_common::{HotelCode, PropertyId};
use htng_errors::CoreError;

#[async_trait]
pub trait Transport: Send + Sync {
    /// POST the envelope for `property_id`/`hotel_code`, returning the
    /// raw response body. Transport-level failures (connection refused,
    /// timeout) return a `CoreError` the dispatcher classifies like any
    /// other failure.
    async fn send(&self, property_id: PropertyId, hotel_code: &HotelCode, envelope_xml: &str) -> Result<String, CoreError>;
}
