//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → trust.rs (resolve client IP and host from forwarded headers)
//!     → rate_limit.rs (fixed-window check keyed by resolved identity)
//!     → handler
//!
//! Gateway callbacks:
//!     → signature.rs (Billplz X-Signature) before any payload is believed
//! ```
//!
//! # Design Decisions
//! - Trust failures degrade to the least-trusted value, they never reject
//! - Only operator-configured hops or managed-edge markers are trusted
//! - Signature comparison is constant-time

pub mod rate_limit;
pub mod signature;
pub mod trust;

pub use rate_limit::{FixedWindowLimiter, RateLimitDecision, RateLimitRule};
pub use trust::{TrustResolver, UNKNOWN_CLIENT_IP};
