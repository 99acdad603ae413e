//! Route handlers.
//!
//! Handlers stay thin: decode, call one service, map the domain error
//! through `ApiError::from_error`.

pub mod health;
pub mod parent;
pub mod tenant;
pub mod webhook;
