//! Webhook reconciliation.
//!
//! # Data Flow
//! ```text
//! BillplzWebhook
//!     → lookup payment by bill id (finds the tenant)       none → not_found
//!     → process_billplz_webhook_atomically (one RPC, one transaction)
//!         routine missing → fallback:
//!             get_payment_by_billplz_id → update_payment → record_payment_event
//!     → ReconciliationOutcome
//! ```
//!
//! The fallback exists only for databases that have not been migrated yet.
//! It is not idempotent under concurrent duplicate callbacks: two deliveries
//! racing through it can both apply. Only the atomic path is safe.

use std::sync::Arc;

use uuid::Uuid;

use crate::observability::metrics;
use crate::payments::billplz::BillplzWebhook;
use crate::payments::types::{
    NewWebhookEvent, PaymentRecord, PaymentStatus, PaymentUpdate, ReconciliationOutcome,
    WebhookCommand, WebhookRpcRow,
};
use crate::store::{classify, PaymentStore, StoreError, StoreErrorKind, WEBHOOK_RPC};

/// Which path produced an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilePath {
    Lookup,
    Atomic,
    Fallback,
}

impl ReconcilePath {
    pub fn as_str(self) -> &'static str {
        match self {
            ReconcilePath::Lookup => "lookup",
            ReconcilePath::Atomic => "atomic",
            ReconcilePath::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub outcome: ReconciliationOutcome,
    pub payment_id: Option<Uuid>,
    pub payment_status: Option<PaymentStatus>,
    pub path: ReconcilePath,
}

/// What applying a target status to a stored payment would do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub outcome: ReconciliationOutcome,
    pub next_status: Option<PaymentStatus>,
    pub reason: Option<&'static str>,
}

/// Decide the outcome of moving `current` to `target`.
///
/// Amount disagreement and any move out of a terminal state are conflicts;
/// re-asserting a terminal status is a replay.
pub fn plan_transition(current: &PaymentRecord, amount_cents: i64, target: PaymentStatus) -> Transition {
    let transition = |outcome, next_status, reason| Transition {
        outcome,
        next_status,
        reason,
    };

    if amount_cents != current.total_amount_cents {
        return transition(ReconciliationOutcome::Conflict, None, Some("amount mismatch"));
    }
    if target == current.status {
        return if current.status.is_terminal() {
            transition(ReconciliationOutcome::Replay, None, None)
        } else {
            transition(ReconciliationOutcome::Created, None, None)
        };
    }
    if current.status.can_transition_to(target) {
        transition(ReconciliationOutcome::Applied, Some(target), None)
    } else {
        transition(
            ReconciliationOutcome::Conflict,
            None,
            Some("transition out of a terminal status"),
        )
    }
}

/// Run the atomic webhook procedure.
///
/// Returns the procedure's row verbatim, or `None` when the procedure is not
/// deployed and the caller has to use the fallback. Every other failure,
/// including an empty result, is an error.
pub async fn process_billplz_webhook_atomically(
    store: &dyn PaymentStore,
    cmd: &WebhookCommand,
) -> Result<Option<WebhookRpcRow>, StoreError> {
    match store.process_billplz_webhook(cmd).await {
        Ok(rows) => rows
            .into_iter()
            .next()
            .map(Some)
            .ok_or_else(|| StoreError::other(format!("{WEBHOOK_RPC} returned no rows"))),
        Err(error) => match classify(&error, Some(WEBHOOK_RPC)) {
            StoreErrorKind::MissingRoutine(_) => {
                tracing::warn!(
                    routine = WEBHOOK_RPC,
                    "Atomic webhook routine not deployed; using non-atomic fallback"
                );
                Ok(None)
            }
            _ => Err(error),
        },
    }
}

/// Applies gateway notifications to payment records.
pub struct ReconciliationService {
    store: Arc<dyn PaymentStore>,
}

impl ReconciliationService {
    pub fn new(store: Arc<dyn PaymentStore>) -> Self {
        Self { store }
    }

    pub async fn reconcile(&self, webhook: &BillplzWebhook) -> Result<Reconciliation, StoreError> {
        let result = self.run(webhook).await;

        match &result {
            Ok(done) => {
                metrics::record_reconciliation(done.outcome.as_str(), done.path.as_str());
                tracing::info!(
                    bill_id = %webhook.bill_id,
                    source = webhook.source.as_str(),
                    outcome = done.outcome.as_str(),
                    path = done.path.as_str(),
                    payment_id = ?done.payment_id,
                    "Webhook reconciled"
                );
            }
            Err(error) => {
                tracing::error!(
                    bill_id = %webhook.bill_id,
                    error = %crate::observability::redact_secrets(&error.to_string()),
                    "Webhook reconciliation failed"
                );
            }
        }
        result
    }

    async fn run(&self, webhook: &BillplzWebhook) -> Result<Reconciliation, StoreError> {
        // Callbacks carry no tenant; the payment row supplies it.
        let payment = match self.store.get_payment_by_billplz_id(None, &webhook.bill_id).await {
            Ok(Some(payment)) => payment,
            Ok(None) => return Ok(unmatched(ReconciliationOutcome::NotFound, ReconcilePath::Lookup)),
            Err(error) if classify(&error, None) == StoreErrorKind::MissingRelation => {
                return Ok(unmatched(ReconciliationOutcome::RpcUnavailable, ReconcilePath::Lookup));
            }
            Err(error) => return Err(error),
        };

        let cmd = webhook.to_command(payment.tenant_id);
        match process_billplz_webhook_atomically(self.store.as_ref(), &cmd).await? {
            Some(row) => Ok(Reconciliation {
                outcome: row.outcome,
                payment_id: row.payment_id.or(Some(payment.id)),
                payment_status: row.payment_status,
                path: ReconcilePath::Atomic,
            }),
            None => self.fallback(&cmd).await,
        }
    }

    async fn fallback(&self, cmd: &WebhookCommand) -> Result<Reconciliation, StoreError> {
        let Some(current) = self
            .store
            .get_payment_by_billplz_id(Some(cmd.tenant_id), &cmd.billplz_id)
            .await?
        else {
            return Ok(unmatched(ReconciliationOutcome::NotFound, ReconcilePath::Fallback));
        };

        let done = |outcome, payment: &PaymentRecord| Reconciliation {
            outcome,
            payment_id: Some(payment.id),
            payment_status: Some(payment.status),
            path: ReconcilePath::Fallback,
        };

        let plan = plan_transition(&current, cmd.amount_cents, cmd.target_status);
        if matches!(
            plan.outcome,
            ReconciliationOutcome::Conflict | ReconciliationOutcome::Replay
        ) {
            if let Some(reason) = plan.reason {
                tracing::warn!(bill_id = %cmd.billplz_id, reason, "Webhook not applied");
            }
            return Ok(done(plan.outcome, &current));
        }

        let updated = match plan.next_status {
            Some(status) => {
                let update = PaymentUpdate {
                    status: Some(status),
                    paid_at: (status == PaymentStatus::Paid)
                        .then(|| cmd.paid_at.unwrap_or_else(chrono::Utc::now)),
                    ..PaymentUpdate::default()
                };
                self.store.update_payment(current.id, &update).await?
            }
            None => current,
        };

        let event = NewWebhookEvent {
            tenant_id: cmd.tenant_id,
            payment_id: updated.id,
            source: cmd.source,
            event_type: cmd.event_type.clone(),
            provider_event_id: cmd.provider_event_id.clone(),
            fingerprint: cmd.fingerprint.clone(),
            payload: cmd.payload.clone(),
        };
        match self.store.record_payment_event(&event).await {
            Ok(_) => Ok(done(plan.outcome, &updated)),
            Err(error) => match classify(&error, None) {
                StoreErrorKind::UniqueViolation => Ok(done(ReconciliationOutcome::Replay, &updated)),
                StoreErrorKind::MissingRelation => {
                    Ok(done(ReconciliationOutcome::RpcUnavailable, &updated))
                }
                _ => Err(error),
            },
        }
    }
}

fn unmatched(outcome: ReconciliationOutcome, path: ReconcilePath) -> Reconciliation {
    Reconciliation {
        outcome,
        payment_id: None,
        payment_status: None,
        path,
    }
}
