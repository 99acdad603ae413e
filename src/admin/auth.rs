use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::http::request::request_id;
use crate::http::response::ApiError;
use crate::http::server::AppState;

/// Constant-time comparison of two keys, by MAC-ing both under a fixed key.
fn keys_match(provided: &str, expected: &str) -> bool {
    let mac_of = |value: &str| {
        Hmac::<Sha256>::new_from_slice(b"admin-key-compare").map(|mut mac| {
            mac.update(value.as_bytes());
            mac
        })
    };
    let (Ok(expected_mac), Ok(provided_mac)) = (mac_of(expected), mac_of(provided)) else {
        return false;
    };
    provided_mac
        .verify_slice(&expected_mac.finalize().into_bytes())
        .is_ok()
}

pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let expected = state.inner.config.admin.api_key.as_str();

    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|key| !expected.is_empty() && keys_match(key, expected));

    if authorized {
        return next.run(request).await;
    }

    tracing::warn!(path = %request.uri().path(), "Admin request rejected");
    ApiError::new(
        StatusCode::UNAUTHORIZED,
        "unauthorized",
        "Admin key required.",
        request_id(request.headers()),
    )
    .into_response()
}
