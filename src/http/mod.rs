//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request id, timeout, body limit, trace)
//!     → middleware/attribution.rs (RequestContext: request id, host, client IP)
//!     → auth.rs (bearer session → TenantUser, where the route needs one)
//!     → handlers/ (decode, call a payments or tenant service)
//!     → response.rs (public error JSON)
//!     → Send to client
//! ```

pub mod auth;
pub mod handlers;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestContext, X_REQUEST_ID};
pub use response::{ApiError, PublicError};
pub use server::{AppState, HttpServer, Services};
