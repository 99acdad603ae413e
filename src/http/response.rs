//! Public error responses.
//!
//! Every API failure renders as `{error, code, request_id, ...extra}`.
//! Domain errors describe themselves through `PublicError`; only
//! `public_message` ever reaches the client, and 5xx details are logged
//! after secret redaction.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{Map, Value};

use crate::http::request::RequestContext;
use crate::observability::redact_secrets;

/// Client-safe text for every unclassified failure.
pub const GENERIC_MESSAGE: &str = "Something went wrong. Please try again later.";

/// How a domain error presents itself over HTTP.
pub trait PublicError: std::error::Error {
    fn status_code(&self) -> StatusCode;

    /// Stable machine-readable code.
    fn code(&self) -> &'static str;

    fn public_message(&self) -> String {
        self.to_string()
    }

    /// Additional top-level fields merged into the body.
    fn extra(&self) -> Option<Value> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    request_id: String,
    extra: Option<Value>,
    retry_after_secs: Option<u64>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            request_id: request_id.into(),
            extra: None,
            retry_after_secs: None,
        }
    }

    /// Render a domain error, logging it on the way.
    pub fn from_error<E: PublicError>(error: &E, ctx: &RequestContext) -> Self {
        let status = error.status_code();
        if status.is_server_error() {
            tracing::error!(
                request_id = %ctx.request_id,
                code = error.code(),
                error = %redact_secrets(&error.to_string()),
                "Request failed"
            );
        } else {
            tracing::debug!(
                request_id = %ctx.request_id,
                code = error.code(),
                status = status.as_u16(),
                "Request rejected"
            );
        }

        let mut api = Self::new(status, error.code(), error.public_message(), &ctx.request_id);
        api.extra = error.extra();
        api
    }

    pub fn rate_limited(request_id: impl Into<String>, retry_after_secs: u64) -> Self {
        let mut api = Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limited",
            "Too many requests. Please slow down.",
            request_id,
        );
        api.retry_after_secs = Some(retry_after_secs);
        api.extra = Some(serde_json::json!({ "retry_after_seconds": retry_after_secs }));
        api
    }

    pub fn with_extra(mut self, extra: Value) -> Self {
        self.extra = Some(extra);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    fn body(&self) -> Value {
        let mut body = Map::new();
        if let Some(Value::Object(extra)) = &self.extra {
            body.extend(extra.clone());
        }
        body.insert("error".into(), Value::String(self.message.clone()));
        body.insert("code".into(), Value::String(self.code.to_string()));
        body.insert("request_id".into(), Value::String(self.request_id.clone()));
        Value::Object(body)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.body())).into_response();
        if let Some(secs) = self.retry_after_secs {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
