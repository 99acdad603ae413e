//! `POST /api/billplz/webhook`
//!
//! The callback is form-encoded. The signature is checked over the raw
//! fields before anything in the payload is trusted.

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::http::request::RequestContext;
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::payments::types::WebhookSource;
use crate::payments::{BillplzWebhook, WebhookError};
use crate::security::signature;

pub async fn billplz_webhook(
    State(state): State<AppState>,
    ctx: RequestContext,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    handle(&state, &body).await.map_err(|error| {
        metrics::record_webhook_rejected(error.reason());
        ApiError::from_error(&error, &ctx)
    })
}

async fn handle(state: &AppState, body: &[u8]) -> Result<Json<Value>, WebhookError> {
    let fields: Vec<(String, String)> = url::form_urlencoded::parse(body).into_owned().collect();

    let key = state.inner.config.billplz.x_signature_key.as_str();
    if key.is_empty() {
        return Err(WebhookError::SignatureKeyMissing);
    }
    signature::verify(&fields, key)?;

    let webhook = BillplzWebhook::from_fields(&fields, WebhookSource::Webhook)?;
    let done = state
        .inner
        .reconciliation
        .reconcile(&webhook)
        .await
        .map_err(WebhookError::Store)?;

    if !done.outcome.is_acknowledged() {
        return Err(WebhookError::Rejected(done.outcome));
    }
    Ok(Json(json!({ "ok": true, "outcome": done.outcome.as_str() })))
}
