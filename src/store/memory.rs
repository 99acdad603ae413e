//! In-process store.
//!
//! Holds every table behind one `tokio::sync::Mutex`, so each procedure runs
//! as a single transaction. Used by tests and for local runs without a
//! database. `set_webhook_rpc_deployed(false)` makes the atomic webhook
//! procedure fail the way an unmigrated database does.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    PaymentStore, SessionStore, StoreError, TenantStore, UNDEFINED_FUNCTION, UNIQUE_VIOLATION,
    WEBHOOK_RPC,
};
use crate::payments::reconcile::plan_transition;
use crate::payments::types::{
    MoveOnlineApplyRow, MoveOnlineCommand, NewPayment, NewWebhookEvent, OnlinePayCommand,
    OnlinePayRow, PaymentRecord, PaymentStatus, PaymentUpdate, ReconciliationOutcome,
    WebhookCommand, WebhookEvent, WebhookRpcRow,
};
use crate::tenant::types::{TenantRecord, TenantUser};

/// PostgREST "no rows" code, reused for missing update targets.
const NO_ROWS: &str = "PGRST116";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimStatus {
    Held,
    Paid,
    Cancelled,
}

/// A seat held for a parent pending online payment.
#[derive(Debug, Clone, PartialEq)]
pub struct OnlineClaim {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub parent_id: Uuid,
    pub status: ClaimStatus,
    pub hold_expires_at: DateTime<Utc>,
    pub payment_reference: Option<String>,
}

/// An online registration waiting to become an active student.
#[derive(Debug, Clone, PartialEq)]
pub struct StagingStudent {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub full_name: String,
    pub moved_student_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Student {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub full_name: String,
    pub active: bool,
}

#[derive(Debug, Default)]
struct Tables {
    payments: HashMap<Uuid, PaymentRecord>,
    events: Vec<WebhookEvent>,
    claims: HashMap<Uuid, OnlineClaim>,
    staging: HashMap<Uuid, StagingStudent>,
    students: HashMap<Uuid, Student>,
    tenants: HashMap<Uuid, TenantRecord>,
    sessions: HashMap<String, TenantUser>,
}

impl Tables {
    fn payment_by_bill(&self, tenant_id: Option<Uuid>, billplz_id: &str) -> Option<&PaymentRecord> {
        self.payments.values().find(|p| {
            p.billplz_id.as_deref() == Some(billplz_id)
                && tenant_id.map_or(true, |t| p.tenant_id == t)
        })
    }

    fn apply_update(
        &mut self,
        payment_id: Uuid,
        update: &PaymentUpdate,
    ) -> Result<PaymentRecord, StoreError> {
        let payment = self
            .payments
            .get_mut(&payment_id)
            .ok_or_else(|| StoreError::new(NO_ROWS, "update matched no payment row"))?;

        if let Some(status) = update.status {
            payment.status = status;
        }
        if let Some(billplz_id) = &update.billplz_id {
            payment.billplz_id = Some(billplz_id.clone());
        }
        if update.paid_at.is_some() {
            payment.paid_at = update.paid_at;
        }
        if update.expires_at.is_some() {
            payment.expires_at = update.expires_at;
        }
        payment.updated_at = Utc::now();
        Ok(payment.clone())
    }

    fn insert_event(&mut self, event: &NewWebhookEvent) -> Result<WebhookEvent, StoreError> {
        let duplicate = self.events.iter().any(|e| {
            e.tenant_id == event.tenant_id && e.provider_event_id == event.provider_event_id
        });
        if duplicate {
            return Err(StoreError::new(
                UNIQUE_VIOLATION,
                "duplicate key value violates unique constraint \"payment_webhook_events_tenant_provider_event_key\"",
            ));
        }

        let row = WebhookEvent {
            id: Uuid::new_v4(),
            tenant_id: event.tenant_id,
            payment_id: event.payment_id,
            source: event.source,
            event_type: event.event_type.clone(),
            provider_event_id: event.provider_event_id.clone(),
            fingerprint: event.fingerprint.clone(),
            payload: event.payload.clone(),
            received_at: Utc::now(),
        };
        self.events.push(row.clone());
        Ok(row)
    }
}

/// Transactional in-memory implementation of every store trait.
#[derive(Debug)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    webhook_rpc_deployed: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            webhook_rpc_deployed: AtomicBool::new(true),
        }
    }

    /// Simulate a database with or without the atomic webhook procedure.
    pub fn set_webhook_rpc_deployed(&self, deployed: bool) {
        self.webhook_rpc_deployed.store(deployed, Ordering::SeqCst);
    }

    pub async fn seed_tenant(&self, tenant: TenantRecord) {
        self.tables.lock().await.tenants.insert(tenant.id, tenant);
    }

    pub async fn seed_session(&self, token: impl Into<String>, user: TenantUser) {
        self.tables.lock().await.sessions.insert(token.into(), user);
    }

    pub async fn seed_payment(&self, payment: PaymentRecord) {
        self.tables.lock().await.payments.insert(payment.id, payment);
    }

    pub async fn seed_claim(&self, claim: OnlineClaim) {
        self.tables.lock().await.claims.insert(claim.id, claim);
    }

    pub async fn seed_staging(&self, staging: StagingStudent) {
        self.tables.lock().await.staging.insert(staging.id, staging);
    }

    pub async fn seed_student(&self, student: Student) {
        self.tables.lock().await.students.insert(student.id, student);
    }

    pub async fn payment(&self, payment_id: Uuid) -> Option<PaymentRecord> {
        self.tables.lock().await.payments.get(&payment_id).cloned()
    }

    pub async fn events_for(&self, payment_id: Uuid) -> Vec<WebhookEvent> {
        self.tables
            .lock()
            .await
            .events
            .iter()
            .filter(|e| e.payment_id == payment_id)
            .cloned()
            .collect()
    }

    pub async fn claim(&self, claim_id: Uuid) -> Option<OnlineClaim> {
        self.tables.lock().await.claims.get(&claim_id).cloned()
    }

    pub async fn student(&self, student_id: Uuid) -> Option<Student> {
        self.tables.lock().await.students.get(&student_id).cloned()
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn process_billplz_webhook(
        &self,
        cmd: &WebhookCommand,
    ) -> Result<Vec<WebhookRpcRow>, StoreError> {
        if !self.webhook_rpc_deployed.load(Ordering::SeqCst) {
            return Err(StoreError::new(
                UNDEFINED_FUNCTION,
                format!(
                    "function public.{WEBHOOK_RPC}(uuid, text, text, text, bigint, boolean, text, text, date, timestamptz, jsonb) does not exist"
                ),
            )
            .with_details("No function matches the given name and argument types."));
        }

        let mut tables = self.tables.lock().await;

        let Some(payment) = tables.payment_by_bill(Some(cmd.tenant_id), &cmd.billplz_id).cloned()
        else {
            return Ok(vec![row(ReconciliationOutcome::NotFound, None, None)]);
        };

        let seen = tables
            .events
            .iter()
            .filter(|e| e.tenant_id == cmd.tenant_id)
            .find(|e| e.provider_event_id == cmd.provider_event_id || e.fingerprint == cmd.fingerprint);
        if let Some(seen) = seen {
            let outcome = if seen.fingerprint == cmd.fingerprint {
                ReconciliationOutcome::Replay
            } else {
                ReconciliationOutcome::Conflict
            };
            let mut out = row(outcome, Some(&payment), Some(seen.id));
            if outcome == ReconciliationOutcome::Conflict {
                out.detail = Some("provider event id reused with a different payload".into());
            }
            return Ok(vec![out]);
        }

        let transition = plan_transition(&payment, cmd.amount_cents, cmd.target_status);
        if transition.outcome == ReconciliationOutcome::Conflict
            || transition.outcome == ReconciliationOutcome::Replay
        {
            let mut out = row(transition.outcome, Some(&payment), None);
            out.detail = transition.reason.map(str::to_string);
            return Ok(vec![out]);
        }

        let event = tables.insert_event(&NewWebhookEvent {
            tenant_id: cmd.tenant_id,
            payment_id: payment.id,
            source: cmd.source,
            event_type: cmd.event_type.clone(),
            provider_event_id: cmd.provider_event_id.clone(),
            fingerprint: cmd.fingerprint.clone(),
            payload: cmd.payload.clone(),
        })?;

        let current = match transition.next_status {
            Some(status) => {
                let update = PaymentUpdate {
                    status: Some(status),
                    paid_at: (status == PaymentStatus::Paid)
                        .then(|| cmd.paid_at.unwrap_or_else(Utc::now)),
                    ..PaymentUpdate::default()
                };
                tables.apply_update(payment.id, &update)?
            }
            None => payment,
        };

        Ok(vec![row(transition.outcome, Some(&current), Some(event.id))])
    }

    async fn get_payment_by_billplz_id(
        &self,
        tenant_id: Option<Uuid>,
        billplz_id: &str,
    ) -> Result<Option<PaymentRecord>, StoreError> {
        Ok(self.tables.lock().await.payment_by_bill(tenant_id, billplz_id).cloned())
    }

    async fn get_payment_by_idempotency_key(
        &self,
        tenant_id: Uuid,
        key: &str,
    ) -> Result<Option<PaymentRecord>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .payments
            .values()
            .find(|p| p.tenant_id == tenant_id && p.idempotency_key.as_deref() == Some(key))
            .cloned())
    }

    async fn insert_payment(&self, payment: &NewPayment) -> Result<PaymentRecord, StoreError> {
        let mut tables = self.tables.lock().await;
        let key = payment.idempotency_key.as_str();
        let duplicate = tables.payments.values().any(|p| {
            p.tenant_id == payment.tenant_id && p.idempotency_key.as_deref() == Some(key)
        });
        if duplicate {
            return Err(StoreError::new(
                UNIQUE_VIOLATION,
                "duplicate key value violates unique constraint \"payments_tenant_idempotency_key_key\"",
            )
            .with_details(format!("Key (tenant_id, idempotency_key)=({}, {key}) already exists.", payment.tenant_id)));
        }

        let now = Utc::now();
        let record = PaymentRecord {
            id: Uuid::new_v4(),
            tenant_id: payment.tenant_id,
            parent_id: payment.parent_id,
            provider_id: payment.provider_id.clone(),
            status: payment.status,
            total_amount_cents: payment.total_amount_cents,
            merchant_fee_cents: payment.merchant_fee_cents,
            billplz_id: None,
            payable_months: payment.payable_months.clone(),
            idempotency_key: Some(key.to_string()),
            paid_at: None,
            expires_at: None,
            created_at: now,
            updated_at: now,
        };
        tables.payments.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_payment(
        &self,
        payment_id: Uuid,
        update: &PaymentUpdate,
    ) -> Result<PaymentRecord, StoreError> {
        self.tables.lock().await.apply_update(payment_id, update)
    }

    async fn record_payment_event(
        &self,
        event: &NewWebhookEvent,
    ) -> Result<WebhookEvent, StoreError> {
        self.tables.lock().await.insert_event(event)
    }

    async fn pay_online_claim(&self, cmd: &OnlinePayCommand) -> Result<OnlinePayRow, StoreError> {
        let mut tables = self.tables.lock().await;
        let failed = |code: &str| OnlinePayRow {
            ok: false,
            code: Some(code.to_string()),
            payment_id: None,
        };

        let Some(claim) = tables
            .claims
            .get_mut(&cmd.claim_id)
            .filter(|c| c.tenant_id == cmd.tenant_id && c.parent_id == cmd.parent_id)
        else {
            return Ok(failed("claim_not_found"));
        };

        if claim.status != ClaimStatus::Held {
            return Ok(failed("invalid_status"));
        }
        if claim.hold_expires_at <= Utc::now() {
            return Ok(failed("hold_expired"));
        }

        claim.status = ClaimStatus::Paid;
        claim.payment_reference = cmd.payment_reference.clone();
        Ok(OnlinePayRow {
            ok: true,
            code: None,
            payment_id: Some(Uuid::new_v4()),
        })
    }

    async fn apply_move_online(
        &self,
        cmd: &MoveOnlineCommand,
    ) -> Result<Vec<MoveOnlineApplyRow>, StoreError> {
        let mut tables = self.tables.lock().await;

        let pending = tables
            .staging
            .get(&cmd.staging_id)
            .filter(|s| s.tenant_id == cmd.tenant_id && s.moved_student_id.is_none())
            .cloned();
        let Some(staging) = pending else {
            return Ok(vec![MoveOnlineApplyRow {
                processed: 0,
                processed_staging_id: None,
                processed_student_id: None,
            }]);
        };

        if tables.students.get(&cmd.student_id).is_some_and(|s| s.active) {
            return Err(StoreError::new(
                UNIQUE_VIOLATION,
                "duplicate key value violates unique constraint \"students_pkey\"",
            ));
        }

        tables.students.insert(
            cmd.student_id,
            Student {
                id: cmd.student_id,
                tenant_id: cmd.tenant_id,
                full_name: staging.full_name.clone(),
                active: true,
            },
        );
        if let Some(row) = tables.staging.get_mut(&staging.id) {
            row.moved_student_id = Some(cmd.student_id);
        }

        Ok(vec![MoveOnlineApplyRow {
            processed: 1,
            processed_staging_id: Some(staging.id),
            processed_student_id: Some(cmd.student_id),
        }])
    }
}

#[async_trait]
impl TenantStore for MemoryStore {
    async fn slug_exists(&self, slug: &str) -> Result<bool, StoreError> {
        Ok(self.tables.lock().await.tenants.values().any(|t| t.slug == slug))
    }

    async fn get_tenant(&self, tenant_id: Uuid) -> Result<Option<TenantRecord>, StoreError> {
        Ok(self.tables.lock().await.tenants.get(&tenant_id).cloned())
    }

    async fn get_tenant_by_slug(&self, slug: &str) -> Result<Option<TenantRecord>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.tenants.values().find(|t| t.slug == slug).cloned())
    }

    async fn get_tenant_by_domain(
        &self,
        domain: &str,
    ) -> Result<Option<TenantRecord>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .tenants
            .values()
            .find(|t| {
                t.custom_domain
                    .as_deref()
                    .is_some_and(|d| d.eq_ignore_ascii_case(domain))
            })
            .cloned())
    }

    async fn count_active_students(&self, tenant_id: Uuid) -> Result<u32, StoreError> {
        let tables = self.tables.lock().await;
        let count = tables
            .students
            .values()
            .filter(|s| s.tenant_id == tenant_id && s.active)
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn resolve_session(&self, token: &str) -> Result<Option<TenantUser>, StoreError> {
        Ok(self.tables.lock().await.sessions.get(token).cloned())
    }
}

fn row(
    outcome: ReconciliationOutcome,
    payment: Option<&PaymentRecord>,
    event_id: Option<Uuid>,
) -> WebhookRpcRow {
    WebhookRpcRow {
        outcome,
        payment_id: payment.map(|p| p.id),
        payment_status: payment.map(|p| p.status),
        event_id,
        detail: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::types::{IdempotencyKey, WebhookSource};
    use crate::store::{classify, StoreErrorKind};

    fn pending_payment(tenant_id: Uuid, bill: &str) -> PaymentRecord {
        let now = Utc::now();
        PaymentRecord {
            id: Uuid::new_v4(),
            tenant_id,
            parent_id: Uuid::new_v4(),
            provider_id: "billplz".into(),
            status: PaymentStatus::Pending,
            total_amount_cents: 15_000,
            merchant_fee_cents: 150,
            billplz_id: Some(bill.into()),
            payable_months: vec!["2026-01".into()],
            idempotency_key: None,
            paid_at: None,
            expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn paid_command(tenant_id: Uuid, bill: &str, fingerprint: &str) -> WebhookCommand {
        WebhookCommand {
            tenant_id,
            billplz_id: bill.into(),
            provider_event_id: format!("{bill}:paid:-"),
            fingerprint: fingerprint.into(),
            amount_cents: 15_000,
            paid: true,
            state: "paid".into(),
            target_status: PaymentStatus::Paid,
            due_at: None,
            paid_at: None,
            source: WebhookSource::Webhook,
            event_type: "billplz.paid".into(),
            payload: serde_json::json!({"id": bill}),
        }
    }

    #[tokio::test]
    async fn test_webhook_rpc_applies_then_replays() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let payment = pending_payment(tenant, "bill_1");
        store.seed_payment(payment.clone()).await;

        let cmd = paid_command(tenant, "bill_1", "fp-1");
        let rows = store.process_billplz_webhook(&cmd).await.unwrap();
        assert_eq!(rows[0].outcome, ReconciliationOutcome::Applied);
        assert_eq!(rows[0].payment_status, Some(PaymentStatus::Paid));

        let rows = store.process_billplz_webhook(&cmd).await.unwrap();
        assert_eq!(rows[0].outcome, ReconciliationOutcome::Replay);
        assert_eq!(store.events_for(payment.id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_same_event_id_different_payload_conflicts() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        store.seed_payment(pending_payment(tenant, "bill_2")).await;

        store
            .process_billplz_webhook(&paid_command(tenant, "bill_2", "fp-a"))
            .await
            .unwrap();
        let rows = store
            .process_billplz_webhook(&paid_command(tenant, "bill_2", "fp-b"))
            .await
            .unwrap();
        assert_eq!(rows[0].outcome, ReconciliationOutcome::Conflict);
    }

    #[tokio::test]
    async fn test_unknown_bill_is_not_found() {
        let store = MemoryStore::new();
        let rows = store
            .process_billplz_webhook(&paid_command(Uuid::new_v4(), "nope", "fp"))
            .await
            .unwrap();
        assert_eq!(rows[0].outcome, ReconciliationOutcome::NotFound);
        assert!(rows[0].payment_id.is_none());
    }

    #[tokio::test]
    async fn test_undeployed_rpc_reports_missing_routine() {
        let store = MemoryStore::new();
        store.set_webhook_rpc_deployed(false);
        let err = store
            .process_billplz_webhook(&paid_command(Uuid::new_v4(), "b", "fp"))
            .await
            .unwrap_err();
        assert_eq!(
            classify(&err, Some(WEBHOOK_RPC)),
            StoreErrorKind::MissingRoutine(WEBHOOK_RPC.into())
        );
    }

    #[tokio::test]
    async fn test_duplicate_idempotency_key_is_unique_violation() {
        let store = MemoryStore::new();
        let new = NewPayment {
            tenant_id: Uuid::new_v4(),
            parent_id: Uuid::new_v4(),
            provider_id: "billplz".into(),
            status: PaymentStatus::Draft,
            total_amount_cents: 5_000,
            merchant_fee_cents: 0,
            payable_months: vec![],
            idempotency_key: IdempotencyKey::parse("order-0001").unwrap(),
        };
        store.insert_payment(&new).await.unwrap();
        let err = store.insert_payment(&new).await.unwrap_err();
        assert_eq!(classify(&err, None), StoreErrorKind::UniqueViolation);
    }

    #[tokio::test]
    async fn test_move_online_moves_once() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let staging = StagingStudent {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            full_name: "Aisyah".into(),
            moved_student_id: None,
        };
        store.seed_staging(staging.clone()).await;
        let cmd = MoveOnlineCommand {
            tenant_id: tenant,
            staging_id: staging.id,
            student_id: Uuid::new_v4(),
        };

        let rows = store.apply_move_online(&cmd).await.unwrap();
        assert_eq!(rows[0].processed, 1);
        assert_eq!(rows[0].processed_student_id, Some(cmd.student_id));
        assert_eq!(store.count_active_students(tenant).await.unwrap(), 1);

        let rows = store.apply_move_online(&cmd).await.unwrap();
        assert_eq!(rows[0].processed, 0);
    }
}
