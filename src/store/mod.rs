//! Backing-store boundary.
//!
//! # Data Flow
//! ```text
//! handlers / services
//!     → PaymentStore / TenantStore / SessionStore (async traits)
//!     → postgrest.rs (HTTP RPC + table access, service-role key)
//!       or memory.rs (in-process, one mutex = one transaction)
//!     → StoreError { code, message, details }
//!     → classify() → StoreErrorKind
//! ```
//!
//! # Design Decisions
//! - Stores are constructed once at startup and injected as `Arc<dyn …>`
//! - All error sniffing (SQLSTATE codes, "does not exist" text) lives in `classify`
//! - Stored procedures are opaque: the store only forwards arguments and decodes rows

pub mod memory;
pub mod postgrest;

use std::fmt;

use async_trait::async_trait;
use uuid::Uuid;

use crate::payments::types::{
    MoveOnlineApplyRow, MoveOnlineCommand, NewPayment, NewWebhookEvent, OnlinePayCommand,
    OnlinePayRow, PaymentRecord, PaymentUpdate, WebhookCommand, WebhookEvent, WebhookRpcRow,
};
use crate::tenant::types::{TenantRecord, TenantUser};

pub use memory::MemoryStore;
pub use postgrest::PostgrestStore;

/// Postgres `unique_violation`.
pub const UNIQUE_VIOLATION: &str = "23505";
/// Postgres `undefined_function`.
pub const UNDEFINED_FUNCTION: &str = "42883";
/// Postgres `undefined_table`.
pub const UNDEFINED_TABLE: &str = "42P01";
/// PostgREST: function not found in the schema cache.
pub const PGRST_FUNCTION_NOT_FOUND: &str = "PGRST202";

/// Atomic webhook reconciliation procedure.
pub const WEBHOOK_RPC: &str = "process_billplz_webhook";
/// Online claim payment procedure.
pub const ONLINE_PAY_RPC: &str = "pay_online_claim";
/// Staging → active student migration procedure.
pub const MOVE_ONLINE_RPC: &str = "apply_move_online";

/// Failure reported by the backing store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreError {
    pub code: Option<String>,
    pub message: Option<String>,
    pub details: Option<String>,
}

impl StoreError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: Some(message.into()),
            details: None,
        }
    }

    /// Error without a store code (transport failures, decode errors).
    pub fn other(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: Some(message.into()),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or("")
    }

    /// Message and details joined, lowercased, for pattern matching.
    fn haystack(&self) -> String {
        let mut text = self.message().to_ascii_lowercase();
        if let Some(details) = &self.details {
            text.push(' ');
            text.push_str(&details.to_ascii_lowercase());
        }
        text
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.code, &self.message) {
            (Some(code), Some(message)) => write!(f, "{code}: {message}"),
            (Some(code), None) => write!(f, "{code}"),
            (None, Some(message)) => f.write_str(message),
            (None, None) => f.write_str("store error"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Closed classification of store failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreErrorKind {
    UniqueViolation,
    /// The named routine is not deployed yet.
    MissingRoutine(String),
    MissingRelation,
    Other,
}

/// Classify a store failure.
///
/// A missing routine is only reported when `routine` is named in the error
/// text, so an unrelated "does not exist" inside a deployed procedure stays
/// fatal.
pub fn classify(error: &StoreError, routine: Option<&str>) -> StoreErrorKind {
    let code = error.code.as_deref().unwrap_or("");
    if code == UNIQUE_VIOLATION {
        return StoreErrorKind::UniqueViolation;
    }

    let text = error.haystack();

    if let Some(routine) = routine {
        let missing_text = text.contains("does not exist")
            || text.contains("could not find the function");
        let missing = code == UNDEFINED_FUNCTION || code == PGRST_FUNCTION_NOT_FOUND || missing_text;
        if missing && text.contains(&routine.to_ascii_lowercase()) {
            return StoreErrorKind::MissingRoutine(routine.to_string());
        }
    }

    if code == UNDEFINED_TABLE || (text.contains("relation") && text.contains("does not exist")) {
        return StoreErrorKind::MissingRelation;
    }

    StoreErrorKind::Other
}

/// Payment tables and procedures.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Run the atomic webhook procedure. Returns every row it produced.
    async fn process_billplz_webhook(
        &self,
        cmd: &WebhookCommand,
    ) -> Result<Vec<WebhookRpcRow>, StoreError>;

    async fn get_payment_by_billplz_id(
        &self,
        tenant_id: Option<Uuid>,
        billplz_id: &str,
    ) -> Result<Option<PaymentRecord>, StoreError>;

    async fn get_payment_by_idempotency_key(
        &self,
        tenant_id: Uuid,
        key: &str,
    ) -> Result<Option<PaymentRecord>, StoreError>;

    async fn insert_payment(&self, payment: &NewPayment) -> Result<PaymentRecord, StoreError>;

    async fn update_payment(
        &self,
        payment_id: Uuid,
        update: &PaymentUpdate,
    ) -> Result<PaymentRecord, StoreError>;

    async fn record_payment_event(
        &self,
        event: &NewWebhookEvent,
    ) -> Result<WebhookEvent, StoreError>;

    async fn pay_online_claim(&self, cmd: &OnlinePayCommand) -> Result<OnlinePayRow, StoreError>;

    async fn apply_move_online(
        &self,
        cmd: &MoveOnlineCommand,
    ) -> Result<Vec<MoveOnlineApplyRow>, StoreError>;
}

/// Tenant directory.
#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn slug_exists(&self, slug: &str) -> Result<bool, StoreError>;

    async fn get_tenant(&self, tenant_id: Uuid) -> Result<Option<TenantRecord>, StoreError>;

    async fn get_tenant_by_slug(&self, slug: &str) -> Result<Option<TenantRecord>, StoreError>;

    async fn get_tenant_by_domain(&self, domain: &str)
        -> Result<Option<TenantRecord>, StoreError>;

    async fn count_active_students(&self, tenant_id: Uuid) -> Result<u32, StoreError>;
}

/// Session lookup. Issuing sessions happens elsewhere.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn resolve_session(&self, token: &str) -> Result<Option<TenantUser>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_violation_by_code() {
        let err = StoreError::new(
            "23505",
            "duplicate key value violates unique constraint \"payments_idempotency_key_key\"",
        );
        assert_eq!(classify(&err, None), StoreErrorKind::UniqueViolation);
    }

    #[test]
    fn test_missing_routine_by_code_and_name() {
        let err = StoreError::new(
            "42883",
            "function public.process_billplz_webhook(uuid, text) does not exist",
        );
        assert_eq!(
            classify(&err, Some(WEBHOOK_RPC)),
            StoreErrorKind::MissingRoutine(WEBHOOK_RPC.to_string())
        );
    }

    #[test]
    fn test_missing_routine_from_postgrest_hint() {
        let err = StoreError::new(
            "PGRST202",
            "Could not find the function public.process_billplz_webhook in the schema cache",
        );
        assert!(matches!(
            classify(&err, Some(WEBHOOK_RPC)),
            StoreErrorKind::MissingRoutine(_)
        ));
    }

    #[test]
    fn test_does_not_exist_for_other_routine_is_not_missing() {
        let err = StoreError::other("function public.some_helper(int) does not exist");
        assert_eq!(classify(&err, Some(WEBHOOK_RPC)), StoreErrorKind::Other);
    }

    #[test]
    fn test_missing_relation() {
        let err = StoreError::new("42P01", "relation \"payment_webhook_events\" does not exist");
        assert_eq!(classify(&err, None), StoreErrorKind::MissingRelation);
        let err = StoreError::other("relation \"students\" does not exist");
        assert_eq!(classify(&err, Some(WEBHOOK_RPC)), StoreErrorKind::MissingRelation);
    }

    #[test]
    fn test_generic_failure() {
        assert_eq!(classify(&StoreError::other("db timeout"), None), StoreErrorKind::Other);
        assert_eq!(classify(&StoreError::default(), Some(WEBHOOK_RPC)), StoreErrorKind::Other);
    }

    #[test]
    fn test_display() {
        assert_eq!(StoreError::new("23505", "dup").to_string(), "23505: dup");
        assert_eq!(StoreError::other("db timeout").to_string(), "db timeout");
    }
}
