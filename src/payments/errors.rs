//! Payment failure taxonomy.
//!
//! Store failures are classified once (`store::classify`) and translated here.
//! Unique violations become domain conflicts (409); everything unrecognised is
//! an opaque 500 whose client message carries no internal detail.

use axum::http::StatusCode;
use thiserror::Error;
use uuid::Uuid;

use crate::http::response::{PublicError, GENERIC_MESSAGE};
use crate::payments::types::{MoveOnlineApplyRow, ReconciliationOutcome};
use crate::security::signature::SignatureError;
use crate::store::{classify, StoreError, StoreErrorKind};
use crate::tenant::TenantError;

#[derive(Debug, Error)]
pub enum PaymentError {
    /// The idempotency key was already used for a different payment.
    #[error("idempotency key already used for a different payment")]
    IdempotencyConflict,

    #[error("Idempotency-Key must be 8-255 visible ASCII characters")]
    InvalidIdempotencyKey,

    #[error("{0}")]
    InvalidRequest(String),

    #[error("payment not found")]
    NotFound,

    #[error("payment gateway is not configured")]
    GatewayUnavailable,

    #[error("payment gateway request failed: {0}")]
    Gateway(String),

    #[error("payment store failure: {0}")]
    Store(StoreError),
}

/// Translate a store failure raised while writing a payment.
pub fn to_payment_error(error: StoreError) -> PaymentError {
    match classify(&error, None) {
        StoreErrorKind::UniqueViolation => PaymentError::IdempotencyConflict,
        _ => PaymentError::Store(error),
    }
}

impl PublicError for PaymentError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::IdempotencyConflict => StatusCode::CONFLICT,
            Self::InvalidIdempotencyKey | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::GatewayUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Gateway(_) => StatusCode::BAD_GATEWAY,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::IdempotencyConflict => "payment_idempotency_conflict",
            Self::InvalidIdempotencyKey => "invalid_idempotency_key",
            Self::InvalidRequest(_) => "invalid_request",
            Self::NotFound => "payment_not_found",
            Self::GatewayUnavailable => "payment_gateway_unavailable",
            Self::Gateway(_) => "payment_gateway_error",
            Self::Store(_) => "internal_error",
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::IdempotencyConflict => {
                "This idempotency key was already used for a different payment.".to_string()
            }
            Self::Gateway(_) => "The payment gateway did not accept the bill. Please try again.".to_string(),
            Self::Store(_) => GENERIC_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum MoveOnlineError {
    /// The procedure reported no processed row.
    #[error("staging registration {staging_id} was not moved")]
    NotApplied { staging_id: Uuid },

    /// The procedure reported a row other than the one requested.
    #[error(
        "move confirmed staging {actual_staging:?} / student {actual_student:?}, expected {expected_staging} / {expected_student}"
    )]
    Mismatch {
        expected_staging: Uuid,
        expected_student: Uuid,
        actual_staging: Option<Uuid>,
        actual_student: Option<Uuid>,
    },

    #[error("student is already active")]
    Conflict,

    #[error(transparent)]
    Tenant(#[from] TenantError),

    #[error("move online failed: {0}")]
    Internal(StoreError),
}

/// Translate a store failure raised by the migration procedure.
pub fn to_move_online_error(error: StoreError) -> MoveOnlineError {
    match classify(&error, None) {
        StoreErrorKind::UniqueViolation => MoveOnlineError::Conflict,
        _ => MoveOnlineError::Internal(error),
    }
}

/// Accept the migration only when the procedure confirms exactly the
/// requested staging row and student.
pub fn validate_move_online_apply_result(
    row: Option<&MoveOnlineApplyRow>,
    staging_id: Uuid,
    student_id: Uuid,
) -> Result<(), MoveOnlineError> {
    let Some(row) = row.filter(|r| r.processed > 0) else {
        return Err(MoveOnlineError::NotApplied { staging_id });
    };

    if row.processed_staging_id == Some(staging_id) && row.processed_student_id == Some(student_id) {
        Ok(())
    } else {
        Err(MoveOnlineError::Mismatch {
            expected_staging: staging_id,
            expected_student: student_id,
            actual_staging: row.processed_staging_id,
            actual_student: row.processed_student_id,
        })
    }
}

impl PublicError for MoveOnlineError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotApplied { .. } | Self::Mismatch { .. } | Self::Conflict => StatusCode::CONFLICT,
            Self::Tenant(inner) => inner.status_code(),
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::NotApplied { .. } => "move_online_not_applied",
            Self::Mismatch { .. } => "move_online_mismatch",
            Self::Conflict => "move_online_conflict",
            Self::Tenant(inner) => inner.code(),
            Self::Internal(_) => "internal_error",
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::NotApplied { .. } => {
                "The registration was not moved. It may already have been processed.".to_string()
            }
            Self::Mismatch { .. } => {
                "The registration could not be confirmed. Please retry.".to_string()
            }
            Self::Conflict => "This student is already active.".to_string(),
            Self::Tenant(inner) => inner.public_message(),
            Self::Internal(_) => GENERIC_MESSAGE.to_string(),
        }
    }

    fn extra(&self) -> Option<serde_json::Value> {
        match self {
            Self::Tenant(inner) => inner.extra(),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum OnlinePayError {
    #[error("the seat hold has expired")]
    HoldExpired,

    #[error("the claim cannot be paid in its current status")]
    InvalidStatus,

    #[error("claim not found")]
    ClaimNotFound,

    #[error("{0}")]
    InvalidRequest(String),

    /// The procedure answered with a code this service does not know.
    #[error("online pay rejected with code {0}")]
    Rejected(String),

    #[error("online pay failed: {0}")]
    Store(StoreError),
}

impl OnlinePayError {
    /// Map a procedure result code.
    pub fn from_code(code: &str) -> Self {
        match code {
            "hold_expired" => Self::HoldExpired,
            "invalid_status" => Self::InvalidStatus,
            "claim_not_found" => Self::ClaimNotFound,
            "invalid_request" => Self::InvalidRequest("invalid request".to_string()),
            other => Self::Rejected(other.to_string()),
        }
    }
}

impl PublicError for OnlinePayError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::HoldExpired | Self::InvalidStatus => StatusCode::CONFLICT,
            Self::ClaimNotFound => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Rejected(_) | Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::HoldExpired => "hold_expired",
            Self::InvalidStatus => "invalid_status",
            Self::ClaimNotFound => "claim_not_found",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Rejected(_) | Self::Store(_) => "internal_error",
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::Rejected(_) | Self::Store(_) => GENERIC_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("payload has no bill id")]
    MissingBillId,

    #[error("invalid signature: {0}")]
    InvalidSignature(#[from] SignatureError),

    /// No X-Signature key configured; callbacks are refused.
    #[error("webhook signature key is not configured")]
    SignatureKeyMissing,

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("reconciliation outcome {}", .0.as_str())]
    Rejected(ReconciliationOutcome),

    #[error("reconciliation failed: {0}")]
    Store(StoreError),
}

impl WebhookError {
    /// Metric label for the rejection.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingBillId => "missing_bill_id",
            Self::InvalidSignature(_) => "invalid_signature",
            Self::SignatureKeyMissing => "not_configured",
            Self::InvalidPayload(_) => "invalid_payload",
            Self::Rejected(outcome) => outcome.as_str(),
            Self::Store(_) => "store_error",
        }
    }
}

impl PublicError for WebhookError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingBillId | Self::InvalidSignature(_) | Self::InvalidPayload(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::SignatureKeyMissing => StatusCode::SERVICE_UNAVAILABLE,
            Self::Rejected(ReconciliationOutcome::NotFound) => StatusCode::NOT_FOUND,
            Self::Rejected(ReconciliationOutcome::Conflict) => StatusCode::CONFLICT,
            Self::Rejected(ReconciliationOutcome::RpcUnavailable) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Rejected(_) | Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::MissingBillId => "missing_bill_id",
            Self::InvalidSignature(_) => "invalid_signature",
            Self::SignatureKeyMissing => "webhook_not_configured",
            Self::InvalidPayload(_) => "invalid_payload",
            Self::Rejected(ReconciliationOutcome::NotFound) => "payment_not_found",
            Self::Rejected(ReconciliationOutcome::Conflict) => "webhook_conflict",
            Self::Rejected(ReconciliationOutcome::RpcUnavailable) => "reconciliation_unavailable",
            Self::Rejected(_) | Self::Store(_) => "internal_error",
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::MissingBillId => "Missing bill id.".to_string(),
            Self::InvalidSignature(_) => "Invalid signature.".to_string(),
            Self::SignatureKeyMissing => "Webhook is not configured.".to_string(),
            Self::InvalidPayload(_) => "Invalid payload.".to_string(),
            Self::Rejected(ReconciliationOutcome::NotFound) => "Payment not found.".to_string(),
            Self::Rejected(ReconciliationOutcome::Conflict) => {
                "Webhook conflicts with the recorded payment.".to_string()
            }
            Self::Rejected(ReconciliationOutcome::RpcUnavailable) => {
                "Reconciliation is temporarily unavailable.".to_string()
            }
            Self::Rejected(_) | Self::Store(_) => GENERIC_MESSAGE.to_string(),
        }
    }
}
