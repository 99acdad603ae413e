//! Payment intents: an idempotent payment record plus a Billplz bill.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use uuid::Uuid;

use crate::observability::redact_secrets;
use crate::payments::client::{BillGateway, CreateBill};
use crate::payments::errors::{to_payment_error, PaymentError};
use crate::payments::types::{IdempotencyKey, NewPayment, PaymentRecord, PaymentStatus, PaymentUpdate};
use crate::store::PaymentStore;

pub const PROVIDER_BILLPLZ: &str = "billplz";

/// A parent's request to pay for one or more months.
#[derive(Debug, Clone, PartialEq)]
pub struct IntentRequest {
    pub tenant_id: Uuid,
    pub parent_id: Uuid,
    pub amount_cents: i64,
    pub merchant_fee_cents: i64,
    pub payable_months: Vec<String>,
    pub payer_name: String,
    pub payer_email: String,
    pub description: String,
    /// Raw `Idempotency-Key` header, if the caller sent one.
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntentResult {
    pub payment: PaymentRecord,
    pub bill_url: Option<String>,
    /// The key had already produced this payment.
    pub replayed: bool,
}

/// Insert a payment. A reused idempotency key is a conflict, not a fault.
pub async fn create_payment_record(
    store: &dyn PaymentStore,
    payment: &NewPayment,
) -> Result<PaymentRecord, PaymentError> {
    store.insert_payment(payment).await.map_err(to_payment_error)
}

pub struct PaymentIntentService {
    store: Arc<dyn PaymentStore>,
    gateway: Option<Arc<dyn BillGateway>>,
    bill_ttl: Duration,
}

impl PaymentIntentService {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        gateway: Option<Arc<dyn BillGateway>>,
        bill_ttl_minutes: i64,
    ) -> Self {
        Self {
            store,
            gateway,
            bill_ttl: Duration::minutes(bill_ttl_minutes),
        }
    }

    pub async fn create_intent(&self, request: &IntentRequest) -> Result<IntentResult, PaymentError> {
        validate(request)?;
        let gateway = self.gateway.as_ref().ok_or(PaymentError::GatewayUnavailable)?;

        let key = match &request.idempotency_key {
            Some(raw) => IdempotencyKey::parse(raw)?,
            None => IdempotencyKey::derive(
                request.tenant_id,
                request.parent_id,
                &request.payable_months,
                request.amount_cents,
            ),
        };

        if let Some(replay) = self.replay(request, &key, gateway.as_ref()).await? {
            return Ok(replay);
        }

        let inserted = create_payment_record(
            self.store.as_ref(),
            &NewPayment {
                tenant_id: request.tenant_id,
                parent_id: request.parent_id,
                provider_id: PROVIDER_BILLPLZ.to_string(),
                status: PaymentStatus::Draft,
                total_amount_cents: request.amount_cents,
                merchant_fee_cents: request.merchant_fee_cents,
                payable_months: request.payable_months.clone(),
                idempotency_key: key.clone(),
            },
        )
        .await;
        let payment = match inserted {
            Ok(payment) => payment,
            // A concurrent twin won the unique index between our read and insert.
            Err(PaymentError::IdempotencyConflict) => {
                return match self.replay(request, &key, gateway.as_ref()).await? {
                    Some(replay) => Ok(replay),
                    None => Err(PaymentError::IdempotencyConflict),
                };
            }
            Err(error) => return Err(error),
        };

        // The bill charges the recorded total; the merchant fee is the school's cost.
        let bill = CreateBill {
            payer_name: request.payer_name.clone(),
            payer_email: request.payer_email.clone(),
            amount_cents: payment.total_amount_cents,
            description: request.description.clone(),
            reference: payment.id.to_string(),
        };

        match gateway.create_bill(&bill).await {
            Ok(created) => {
                let update = PaymentUpdate {
                    status: Some(PaymentStatus::Initiated),
                    billplz_id: Some(created.id.clone()),
                    expires_at: Some(Utc::now() + self.bill_ttl),
                    ..PaymentUpdate::default()
                };
                let payment = self
                    .store
                    .update_payment(payment.id, &update)
                    .await
                    .map_err(to_payment_error)?;
                tracing::info!(
                    payment_id = %payment.id,
                    bill_id = %created.id,
                    amount_cents = request.amount_cents,
                    "Payment intent created"
                );
                Ok(IntentResult {
                    bill_url: created.url.or_else(|| gateway.bill_url(&created.id)),
                    payment,
                    replayed: false,
                })
            }
            Err(error) => {
                let detail = redact_secrets(&error.to_string());
                tracing::warn!(payment_id = %payment.id, error = %detail, "Bill creation failed");
                let failed = PaymentUpdate {
                    status: Some(PaymentStatus::Failed),
                    ..PaymentUpdate::default()
                };
                if let Err(store_error) = self.store.update_payment(payment.id, &failed).await {
                    tracing::error!(
                        payment_id = %payment.id,
                        error = %redact_secrets(&store_error.to_string()),
                        "Failed to mark payment as failed"
                    );
                }
                Err(PaymentError::Gateway(detail))
            }
        }
    }

    /// The payment already recorded under `key`, if it is the same intent.
    async fn replay(
        &self,
        request: &IntentRequest,
        key: &IdempotencyKey,
        gateway: &dyn BillGateway,
    ) -> Result<Option<IntentResult>, PaymentError> {
        let existing = self
            .store
            .get_payment_by_idempotency_key(request.tenant_id, key.as_str())
            .await
            .map_err(to_payment_error)?;
        let Some(existing) = existing else {
            return Ok(None);
        };
        if !same_intent(&existing, request) {
            return Err(PaymentError::IdempotencyConflict);
        }
        let bill_url = existing.billplz_id.as_deref().and_then(|id| gateway.bill_url(id));
        Ok(Some(IntentResult {
            payment: existing,
            bill_url,
            replayed: true,
        }))
    }
}

fn validate(request: &IntentRequest) -> Result<(), PaymentError> {
    if request.amount_cents <= 0 {
        return Err(PaymentError::InvalidRequest("amount_cents must be positive".into()));
    }
    if request.merchant_fee_cents < 0 {
        return Err(PaymentError::InvalidRequest("merchant_fee_cents cannot be negative".into()));
    }
    if request.payable_months.is_empty() {
        return Err(PaymentError::InvalidRequest("payable_months is empty".into()));
    }
    if let Some(bad) = request.payable_months.iter().find(|m| !is_month(m)) {
        return Err(PaymentError::InvalidRequest(format!("invalid month {bad:?}, expected YYYY-MM")));
    }
    if request.payer_email.trim().is_empty() || !request.payer_email.contains('@') {
        return Err(PaymentError::InvalidRequest("payer_email is invalid".into()));
    }
    if request.payer_name.trim().is_empty() {
        return Err(PaymentError::InvalidRequest("payer_name is required".into()));
    }
    Ok(())
}

fn is_month(value: &str) -> bool {
    value.len() == 7 && NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d").is_ok()
}

fn same_intent(existing: &PaymentRecord, request: &IntentRequest) -> bool {
    let mut stored = existing.payable_months.clone();
    let mut asked = request.payable_months.clone();
    stored.sort_unstable();
    asked.sort_unstable();
    existing.parent_id == request.parent_id
        && existing.total_amount_cents == request.amount_cents
        && stored == asked
}
