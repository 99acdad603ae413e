//! Operator API.
//!
//! Mounted only when `admin.enabled`; every route requires the configured
//! bearer key.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::{get_rate_limits, get_status, poll_bill};
use crate::http::server::AppState;

pub fn setup_admin_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/rate-limits", get(get_rate_limits))
        .route("/admin/billplz/poll/{bill_id}", post(poll_bill))
        .route_layer(middleware::from_fn_with_state(state, admin_auth_middleware))
}
