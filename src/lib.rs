//! Multi-tenant school platform gateway.
//!
//! Trust-boundary attribution, public endpoint throttling, Billplz payment
//! reconciliation and tenant validation behind one axum server.

pub mod admin;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod payments;
pub mod security;
pub mod store;
pub mod tenant;

pub use config::GatewayConfig;
pub use http::{HttpServer, Services};
pub use lifecycle::Shutdown;
