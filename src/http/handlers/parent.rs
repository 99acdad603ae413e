//! Parent-facing payment routes. Both require a signed-in parent.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::http::auth::AuthUser;
use crate::http::request::{parse_json, RequestContext};
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::payments::{IntentRequest, OnlinePayError, PaymentError};
use crate::tenant::Role;

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

#[derive(Debug, Deserialize)]
struct OnlinePayBody {
    #[serde(default)]
    claim_id: Option<String>,
    #[serde(default)]
    payment_reference: Option<String>,
}

/// `POST /api/parent/online/pay`
pub async fn online_pay(
    State(state): State<AppState>,
    ctx: RequestContext,
    user: AuthUser,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let user = user.require_role(Role::Parent, &ctx)?;
    let body: OnlinePayBody = parse_json(&body, &ctx)?;

    let claim_id = match body.claim_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        None => None,
        Some(raw) => Some(Uuid::parse_str(raw).map_err(|_| {
            ApiError::from_error(&OnlinePayError::InvalidRequest("claim_id is not a valid id".into()), &ctx)
        })?),
    };

    let row = state
        .inner
        .enrollment
        .pay_claim(user, claim_id, body.payment_reference)
        .await
        .map_err(|e| ApiError::from_error(&e, &ctx))?;

    Ok(Json(json!({ "ok": true, "payment_id": row.payment_id })))
}

#[derive(Debug, Deserialize)]
struct PaymentIntentBody {
    amount_cents: i64,
    #[serde(default)]
    merchant_fee_cents: i64,
    payable_months: Vec<String>,
    payer_name: String,
    payer_email: String,
    #[serde(default)]
    description: Option<String>,
}

/// `POST /api/parent/payments`
///
/// 201 for a new intent, 200 when the idempotency key replays an earlier one.
pub async fn create_payment(
    State(state): State<AppState>,
    ctx: RequestContext,
    user: AuthUser,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let user = user.require_role(Role::Parent, &ctx)?;
    let body: PaymentIntentBody = parse_json(&body, &ctx)?;
    let parent_id = user.parent_id.ok_or_else(|| {
        ApiError::from_error(&PaymentError::InvalidRequest("account has no parent profile".into()), &ctx)
    })?;

    let idempotency_key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let description = body
        .description
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| format!("School fees {}", body.payable_months.join(", ")));

    let request = IntentRequest {
        tenant_id: user.tenant_id,
        parent_id,
        amount_cents: body.amount_cents,
        merchant_fee_cents: body.merchant_fee_cents,
        payable_months: body.payable_months,
        payer_name: body.payer_name,
        payer_email: body.payer_email,
        description,
        idempotency_key,
    };

    let result = state
        .inner
        .intents
        .create_intent(&request)
        .await
        .map_err(|e| ApiError::from_error(&e, &ctx))?;

    let status = if result.replayed { StatusCode::OK } else { StatusCode::CREATED };
    Ok((
        status,
        Json(json!({
            "ok": true,
            "payment_id": result.payment.id,
            "status": result.payment.status,
            "bill_url": result.bill_url,
            "replayed": result.replayed,
        })),
    ))
}
