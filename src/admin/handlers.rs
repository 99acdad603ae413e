use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::http::request::RequestContext;
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::observability::redact_secrets;
use crate::payments::{BillplzWebhook, PaymentError, WebhookError};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub gateway_configured: bool,
    pub webhook_signature_configured: bool,
    pub database_configured: bool,
}

#[derive(Serialize)]
pub struct RateLimitSummary {
    pub tracked_keys: usize,
    pub slug_availability_limit: u32,
    pub slug_availability_window_secs: u64,
    pub max_tracked_keys: usize,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let inner = &state.inner;
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: inner.started_at.elapsed().as_secs(),
        gateway_configured: inner.gateway.is_some(),
        webhook_signature_configured: !inner.config.billplz.x_signature_key.is_empty(),
        database_configured: inner.config.database.is_configured(),
    })
}

pub async fn get_rate_limits(State(state): State<AppState>) -> Json<RateLimitSummary> {
    let config = &state.inner.config.rate_limit;
    Json(RateLimitSummary {
        tracked_keys: state.inner.limiter.tracked_keys(),
        slug_availability_limit: config.slug_availability_limit,
        slug_availability_window_secs: config.slug_availability_window_secs,
        max_tracked_keys: config.max_tracked_keys,
    })
}

/// Fetch a bill from Billplz and reconcile it like a callback.
///
/// Used when a callback was lost. The answer always carries the outcome,
/// including outcomes a callback would have been refused with.
pub async fn poll_bill(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(bill_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let gateway = state
        .inner
        .gateway
        .as_ref()
        .ok_or_else(|| ApiError::from_error(&PaymentError::GatewayUnavailable, &ctx))?;

    let bill = gateway.get_bill(&bill_id).await.map_err(|e| {
        ApiError::from_error(&PaymentError::Gateway(redact_secrets(&e.to_string())), &ctx)
    })?;
    let webhook = BillplzWebhook::from_bill(&bill).map_err(|e| ApiError::from_error(&e, &ctx))?;

    let done = state
        .inner
        .reconciliation
        .reconcile(&webhook)
        .await
        .map_err(|e| ApiError::from_error(&WebhookError::Store(e), &ctx))?;

    Ok(Json(json!({
        "ok": done.outcome.is_acknowledged(),
        "bill_id": webhook.bill_id,
        "outcome": done.outcome,
        "path": done.path.as_str(),
        "payment_id": done.payment_id,
        "payment_status": done.payment_status,
    })))
}
