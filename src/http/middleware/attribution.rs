//! Attribution middleware.
//! Resolves who is calling and which host they addressed, once per request.

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};

use crate::http::request::{request_id, RequestContext};
use crate::http::server::AppState;

pub async fn attribute_request(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let trust = &state.inner.trust;
    let ctx = RequestContext {
        request_id: request_id(req.headers()),
        host: trust.resolve_host(req.headers(), req.uri()),
        client_ip: trust.resolve_client_ip(req.headers()),
    };

    tracing::debug!(
        request_id = %ctx.request_id,
        host = ctx.host.as_deref().unwrap_or("-"),
        client_ip = %ctx.client_ip,
        method = %req.method(),
        path = %req.uri().path(),
        "Request attributed"
    );

    req.extensions_mut().insert(ctx);
    next.run(req).await
}
