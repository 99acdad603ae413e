//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters exported to Prometheus)
//!     → redact.rs (scrubs secrets from failure text before it is logged)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through every log line for a request
//! - Metric updates are cheap atomic increments
//! - Unclassified failure text is never logged or returned unredacted

pub mod logging;
pub mod metrics;
pub mod redact;

pub use redact::redact_secrets;
