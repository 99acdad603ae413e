//! Per-request attribution.
//!
//! `RequestContext` is resolved once per request by the attribution
//! middleware (request id, trusted host, trusted client IP) and read back by
//! handlers through the extractor below. It is never cached across requests.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

use crate::security::UNKNOWN_CLIENT_IP;
use crate::http::response::ApiError;

pub const X_REQUEST_ID: &str = "x-request-id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub request_id: String,
    /// Host after trust-boundary resolution (lowercase, no port).
    pub host: Option<String>,
    /// Client IP after trust-boundary resolution, or `"unknown"`.
    pub client_ip: String,
}

impl RequestContext {
    /// Context for a request the middleware did not see.
    fn unattributed(headers: &HeaderMap) -> Self {
        Self {
            request_id: request_id(headers),
            host: None,
            client_ip: UNKNOWN_CLIENT_IP.to_string(),
        }
    }

    /// Reject with a public error carrying this request's id.
    pub fn reject(&self, status: StatusCode, code: &'static str, message: impl Into<String>) -> ApiError {
        ApiError::new(status, code, message, &self.request_id)
    }
}

/// The id set by the request-id layer.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_else(|| RequestContext::unattributed(&parts.headers)))
    }
}

/// Decode a JSON body, answering malformed input with the public error shape.
pub fn parse_json<T: DeserializeOwned>(body: &[u8], ctx: &RequestContext) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| {
        ctx.reject(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            format!("Invalid JSON body: {e}"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Body {
        claim_id: String,
    }

    fn ctx() -> RequestContext {
        RequestContext {
            request_id: "rid-1".into(),
            host: None,
            client_ip: UNKNOWN_CLIENT_IP.into(),
        }
    }

    #[test]
    fn test_request_id_falls_back() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_id(&headers), "unknown");
        headers.insert(X_REQUEST_ID, "abc".parse().unwrap());
        assert_eq!(request_id(&headers), "abc");
    }

    #[test]
    fn test_parse_json() {
        let body: Body = parse_json(br#"{"claim_id":"c1"}"#, &ctx()).unwrap();
        assert_eq!(body.claim_id, "c1");

        let err = parse_json::<Body>(b"{not json", &ctx()).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "invalid_request");
    }
}
