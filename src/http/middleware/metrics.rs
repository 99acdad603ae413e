//! Response counting per matched route.

use axum::{body::Body, extract::MatchedPath, http::Request, middleware::Next, response::Response};

use crate::observability::metrics;

pub async fn track_metrics(req: Request<Body>, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());

    let response = next.run(req).await;
    metrics::record_request(&route, response.status().as_u16());
    response
}
