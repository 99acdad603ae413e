//! Payments subsystem.
//!
//! # Data Flow
//! ```text
//! Billplz callback (form) / poll (JSON)
//!     → billplz.rs (normalize, provider event id, fingerprint)
//!     → reconcile.rs (atomic RPC, fallback when not deployed)
//!     → ReconciliationOutcome → errors.rs (HTTP status + code)
//!
//! Parent checkout
//!     → intent.rs (idempotency key, payment record, bill via client.rs)
//!     → online.rs (held seat payment, staging → active move)
//! ```

pub mod billplz;
pub mod client;
pub mod errors;
pub mod intent;
pub mod online;
pub mod reconcile;
pub mod types;

pub use billplz::{BillplzBill, BillplzWebhook};
pub use client::{BillGateway, BillplzClient, CreateBill, GatewayError};
pub use errors::{
    to_move_online_error, to_payment_error, validate_move_online_apply_result, MoveOnlineError,
    OnlinePayError, PaymentError, WebhookError,
};
pub use intent::{create_payment_record, IntentRequest, IntentResult, PaymentIntentService};
pub use online::OnlineEnrollmentService;
pub use reconcile::{
    process_billplz_webhook_atomically, Reconciliation, ReconcilePath, ReconciliationService,
};
pub use types::{PaymentRecord, PaymentStatus, ReconciliationOutcome};
