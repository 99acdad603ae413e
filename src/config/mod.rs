//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → env.rs (environment overrides: trust lists, secrets)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Environment wins over the file so secrets never need to live on disk

pub mod env;
pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::{
    AdminConfig, BillplzConfig, DatabaseConfig, GatewayConfig, ListenerConfig,
    ObservabilityConfig, RateLimitConfig, TenantConfig, TrustConfig,
};
