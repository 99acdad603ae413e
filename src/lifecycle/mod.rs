//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Ctrl+C / SIGTERM (main.rs)
//!     → Shutdown::trigger
//!     → HttpServer stops accepting, drains in-flight requests, exits
//! ```

pub mod shutdown;

pub use shutdown::Shutdown;
