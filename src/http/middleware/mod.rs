//! Request middleware.
//!
//! - attribution.rs: resolves `RequestContext` from trusted headers
//! - metrics.rs: counts responses per matched route

pub mod attribution;
pub mod metrics;

pub use attribution::attribute_request;
pub use metrics::track_metrics;
