//! Payment records, webhook audit events, and reconciliation results.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::payments::errors::PaymentError;

/// Lifecycle of a payment record.
///
/// `paid`/`refunded` are terminal-success, `failed`/`expired` terminal-failure.
/// Only reconciliation moves a record between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Draft,
    Initiated,
    Pending,
    Paid,
    Failed,
    Expired,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Draft => "draft",
            PaymentStatus::Initiated => "initiated",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Expired => "expired",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn is_terminal_success(self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::Refunded)
    }

    pub fn is_terminal_failure(self) -> bool {
        matches!(self, PaymentStatus::Failed | PaymentStatus::Expired)
    }

    pub fn is_terminal(self) -> bool {
        self.is_terminal_success() || self.is_terminal_failure()
    }

    /// Forward-only guard. Terminal states never change, except `paid → refunded`.
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        match self {
            PaymentStatus::Paid => next == PaymentStatus::Refunded,
            status if status.is_terminal() => false,
            _ => true,
        }
    }
}

/// A payment as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub parent_id: Uuid,
    pub provider_id: String,
    pub status: PaymentStatus,
    pub total_amount_cents: i64,
    pub merchant_fee_cents: i64,
    pub billplz_id: Option<String>,
    pub payable_months: Vec<String>,
    pub idempotency_key: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for a new payment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewPayment {
    pub tenant_id: Uuid,
    pub parent_id: Uuid,
    pub provider_id: String,
    pub status: PaymentStatus,
    pub total_amount_cents: i64,
    pub merchant_fee_cents: i64,
    pub payable_months: Vec<String>,
    pub idempotency_key: IdempotencyKey,
}

/// Partial update; `None` fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PaymentUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<PaymentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billplz_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Where a gateway notification came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookSource {
    Webhook,
    Poll,
}

impl WebhookSource {
    pub fn as_str(self) -> &'static str {
        match self {
            WebhookSource::Webhook => "webhook",
            WebhookSource::Poll => "poll",
        }
    }
}

/// Append-only audit row: one per received webhook or poll result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub payment_id: Uuid,
    pub source: WebhookSource,
    pub event_type: String,
    pub provider_event_id: String,
    pub fingerprint: String,
    pub payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewWebhookEvent {
    pub tenant_id: Uuid,
    pub payment_id: Uuid,
    pub source: WebhookSource,
    pub event_type: String,
    pub provider_event_id: String,
    pub fingerprint: String,
    pub payload: serde_json::Value,
}

/// Closed set of results of one reconciliation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationOutcome {
    /// Event recorded; payment status unchanged.
    Created,
    /// Event already processed; nothing changed.
    Replay,
    /// Event disagrees with what is stored; nothing applied.
    Conflict,
    /// Event recorded and payment transitioned.
    Applied,
    NotFound,
    RpcUnavailable,
}

impl ReconciliationOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            ReconciliationOutcome::Created => "created",
            ReconciliationOutcome::Replay => "replay",
            ReconciliationOutcome::Conflict => "conflict",
            ReconciliationOutcome::Applied => "applied",
            ReconciliationOutcome::NotFound => "not_found",
            ReconciliationOutcome::RpcUnavailable => "rpc_unavailable",
        }
    }

    /// Outcomes acknowledged to the gateway with a 2xx.
    pub fn is_acknowledged(self) -> bool {
        matches!(
            self,
            ReconciliationOutcome::Created
                | ReconciliationOutcome::Replay
                | ReconciliationOutcome::Applied
        )
    }
}

/// Normalized arguments of the atomic webhook procedure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookCommand {
    pub tenant_id: Uuid,
    pub billplz_id: String,
    pub provider_event_id: String,
    pub fingerprint: String,
    pub amount_cents: i64,
    pub paid: bool,
    pub state: String,
    pub target_status: PaymentStatus,
    pub due_at: Option<NaiveDate>,
    pub paid_at: Option<DateTime<Utc>>,
    pub source: WebhookSource,
    pub event_type: String,
    pub payload: serde_json::Value,
}

/// The single row the atomic procedure returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookRpcRow {
    pub outcome: ReconciliationOutcome,
    #[serde(default)]
    pub payment_id: Option<Uuid>,
    #[serde(default)]
    pub payment_status: Option<PaymentStatus>,
    #[serde(default)]
    pub event_id: Option<Uuid>,
    #[serde(default)]
    pub detail: Option<String>,
}

/// Caller-supplied or server-derived key bound 1:1 to a payment intent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    const MAX_LEN: usize = 255;

    /// Accept a caller key: 8 to 255 visible ASCII characters.
    pub fn parse(raw: &str) -> Result<Self, PaymentError> {
        let key = raw.trim();
        let valid = (8..=Self::MAX_LEN).contains(&key.len())
            && key.bytes().all(|b| b.is_ascii_graphic());
        if valid {
            Ok(Self(key.to_string()))
        } else {
            Err(PaymentError::InvalidIdempotencyKey)
        }
    }

    /// Deterministic key for callers that did not send one.
    pub fn derive(tenant_id: Uuid, parent_id: Uuid, months: &[String], amount_cents: i64) -> Self {
        let mut months: Vec<&str> = months.iter().map(String::as_str).collect();
        months.sort_unstable();

        let mut hasher = Sha256::new();
        hasher.update(tenant_id.as_bytes());
        hasher.update(parent_id.as_bytes());
        hasher.update(months.join(",").as_bytes());
        hasher.update(amount_cents.to_be_bytes());
        let digest = hex::encode(hasher.finalize());
        Self(format!("srv_{}", &digest[..32]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Arguments of the online claim payment procedure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OnlinePayCommand {
    pub tenant_id: Uuid,
    pub parent_id: Uuid,
    pub claim_id: Uuid,
    pub payment_reference: Option<String>,
}

/// Result row of the online claim payment procedure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnlinePayRow {
    pub ok: bool,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub payment_id: Option<Uuid>,
}

/// Arguments of the staging → active student migration procedure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoveOnlineCommand {
    pub tenant_id: Uuid,
    pub staging_id: Uuid,
    pub student_id: Uuid,
}

/// Result row of the migration procedure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveOnlineApplyRow {
    pub processed: i64,
    #[serde(default)]
    pub processed_staging_id: Option<Uuid>,
    #[serde(default)]
    pub processed_student_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states_do_not_move_backward() {
        use PaymentStatus::*;
        assert!(Pending.can_transition_to(Paid));
        assert!(Initiated.can_transition_to(Expired));
        assert!(Paid.can_transition_to(Refunded));
        assert!(!Paid.can_transition_to(Failed));
        assert!(!Paid.can_transition_to(Pending));
        assert!(!Expired.can_transition_to(Paid));
        assert!(!Refunded.can_transition_to(Paid));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&PaymentStatus::Paid).unwrap(), "\"paid\"");
        let outcome: ReconciliationOutcome = serde_json::from_str("\"rpc_unavailable\"").unwrap();
        assert_eq!(outcome, ReconciliationOutcome::RpcUnavailable);
    }

    #[test]
    fn test_rpc_row_tolerates_missing_columns() {
        let row: WebhookRpcRow = serde_json::from_str(r#"{"outcome":"replay"}"#).unwrap();
        assert_eq!(row.outcome, ReconciliationOutcome::Replay);
        assert!(row.payment_id.is_none());
    }

    #[test]
    fn test_idempotency_key_parse() {
        assert!(IdempotencyKey::parse("  order-2026-01-abc ").is_ok());
        assert!(IdempotencyKey::parse("short").is_err());
        assert!(IdempotencyKey::parse("has spaces inside").is_err());
        assert!(IdempotencyKey::parse(&"k".repeat(256)).is_err());
    }

    #[test]
    fn test_derived_key_ignores_month_order() {
        let tenant = Uuid::new_v4();
        let parent = Uuid::new_v4();
        let a = IdempotencyKey::derive(tenant, parent, &["2026-02".into(), "2026-01".into()], 12_000);
        let b = IdempotencyKey::derive(tenant, parent, &["2026-01".into(), "2026-02".into()], 12_000);
        let c = IdempotencyKey::derive(tenant, parent, &["2026-01".into()], 12_000);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.as_str().starts_with("srv_"));
        assert_eq!(a.as_str().len(), 36);
    }
}
