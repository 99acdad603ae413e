//! Normalization of Billplz callbacks and bill lookups.
//!
//! Callbacks arrive form-encoded; polled bills arrive as JSON. Both end up as a
//! `BillplzWebhook`, whose provider event id and fingerprint are computed from
//! normalized fields so a poll of an already-delivered callback replays
//! instead of conflicting.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::payments::errors::WebhookError;
use crate::payments::types::{PaymentStatus, WebhookCommand, WebhookSource};
use crate::security::signature::SIGNATURE_FIELD;

/// Billplz renders timestamps as `2026-01-09 16:23:59 +0800`.
const BILLPLZ_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// A bill as returned by the Billplz v3 API.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BillplzBill {
    pub id: String,
    #[serde(default)]
    pub collection_id: Option<String>,
    #[serde(default)]
    pub paid: bool,
    #[serde(default)]
    pub state: Option<String>,
    pub amount: i64,
    #[serde(default)]
    pub paid_amount: Option<i64>,
    #[serde(default)]
    pub due_at: Option<String>,
    #[serde(default)]
    pub paid_at: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// A gateway notification reduced to what reconciliation needs.
#[derive(Debug, Clone, PartialEq)]
pub struct BillplzWebhook {
    pub bill_id: String,
    pub paid: bool,
    pub state: String,
    pub amount_cents: i64,
    pub due_at: Option<NaiveDate>,
    pub paid_at: Option<DateTime<Utc>>,
    pub source: WebhookSource,
    /// Every received field except the signature.
    pub payload: serde_json::Value,
}

impl BillplzWebhook {
    pub fn from_fields(fields: &[(String, String)], source: WebhookSource) -> Result<Self, WebhookError> {
        let get = |name: &str| {
            fields
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.trim())
                .filter(|value| !value.is_empty())
        };

        let bill_id = get("id").ok_or(WebhookError::MissingBillId)?.to_string();
        let paid = get("paid").is_some_and(|v| v.eq_ignore_ascii_case("true"));
        let state = get("state")
            .map(str::to_ascii_lowercase)
            .unwrap_or_else(|| (if paid { "paid" } else { "due" }).to_string());

        let amount_cents = get("amount")
            .ok_or_else(|| WebhookError::InvalidPayload("amount is missing".into()))?
            .parse::<i64>()
            .map_err(|_| WebhookError::InvalidPayload("amount is not an integer".into()))?;

        let paid_at = get("paid_at")
            .map(|raw| {
                parse_timestamp(raw)
                    .ok_or_else(|| WebhookError::InvalidPayload(format!("unreadable paid_at: {raw}")))
            })
            .transpose()?;
        let due_at = get("due_at").and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok());

        let payload = fields
            .iter()
            .filter(|(key, _)| key != SIGNATURE_FIELD)
            .map(|(key, value)| (key.clone(), serde_json::Value::String(value.clone())))
            .collect::<serde_json::Map<_, _>>();

        Ok(Self {
            bill_id,
            paid,
            state,
            amount_cents,
            due_at,
            paid_at,
            source,
            payload: serde_json::Value::Object(payload),
        })
    }

    /// Normalize a polled bill.
    pub fn from_bill(bill: &BillplzBill) -> Result<Self, WebhookError> {
        let mut fields = vec![
            ("id".to_string(), bill.id.clone()),
            ("paid".to_string(), bill.paid.to_string()),
            ("amount".to_string(), bill.amount.to_string()),
        ];
        let optional = [
            ("collection_id", bill.collection_id.clone()),
            ("state", bill.state.clone()),
            ("paid_amount", bill.paid_amount.map(|v| v.to_string())),
            ("due_at", bill.due_at.clone()),
            ("paid_at", bill.paid_at.clone()),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                fields.push((key.to_string(), value));
            }
        }
        Self::from_fields(&fields, WebhookSource::Poll)
    }

    /// `{bill_id}:{state}:{paid_at|-}`.
    pub fn provider_event_id(&self) -> String {
        let paid_at = self
            .paid_at
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_else(|| "-".to_string());
        format!("{}:{}:{}", self.bill_id, self.state, paid_at)
    }

    /// SHA-256 over the sorted normalized fields.
    pub fn fingerprint(&self) -> String {
        let paid_at = self
            .paid_at
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_default();
        let mut pairs = [
            ("amount", self.amount_cents.to_string()),
            ("id", self.bill_id.clone()),
            ("paid", self.paid.to_string()),
            ("paid_at", paid_at),
            ("state", self.state.clone()),
        ];
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        let canonical = pairs
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        hex::encode(Sha256::digest(canonical.as_bytes()))
    }

    /// Status the gateway data asks for.
    pub fn target_status(&self) -> PaymentStatus {
        if self.paid {
            PaymentStatus::Paid
        } else if self.state == "deleted" {
            PaymentStatus::Expired
        } else {
            PaymentStatus::Pending
        }
    }

    pub fn event_type(&self) -> String {
        format!("billplz.{}", self.state)
    }

    pub fn to_command(&self, tenant_id: Uuid) -> WebhookCommand {
        WebhookCommand {
            tenant_id,
            billplz_id: self.bill_id.clone(),
            provider_event_id: self.provider_event_id(),
            fingerprint: self.fingerprint(),
            amount_cents: self.amount_cents,
            paid: self.paid,
            state: self.state.clone(),
            target_status: self.target_status(),
            due_at: self.due_at,
            paid_at: self.paid_at,
            source: self.source,
            event_type: self.event_type(),
            payload: self.payload.clone(),
        }
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw, BILLPLZ_TIME_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|t| t.with_timezone(&Utc))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn paid_callback() -> Vec<(String, String)> {
        fields(&[
            ("id", "W_79pJDk"),
            ("collection_id", "inbmmepb"),
            ("paid", "true"),
            ("state", "paid"),
            ("amount", "15000"),
            ("paid_amount", "15000"),
            ("due_at", "2026-1-9"),
            ("paid_at", "2026-01-09 16:23:59 +0800"),
            ("x_signature", "abc"),
        ])
    }

    #[test]
    fn test_normalizes_paid_callback() {
        let hook = BillplzWebhook::from_fields(&paid_callback(), WebhookSource::Webhook).unwrap();
        assert_eq!(hook.bill_id, "W_79pJDk");
        assert!(hook.paid);
        assert_eq!(hook.amount_cents, 15_000);
        assert_eq!(hook.target_status(), PaymentStatus::Paid);
        assert_eq!(hook.event_type(), "billplz.paid");
        assert_eq!(hook.due_at, NaiveDate::from_ymd_opt(2026, 1, 9));
        assert_eq!(hook.provider_event_id(), "W_79pJDk:paid:2026-01-09T08:23:59Z");
        assert!(hook.payload.get("x_signature").is_none());
    }

    #[test]
    fn test_missing_bill_id() {
        let f = fields(&[("paid", "true"), ("amount", "100")]);
        assert!(matches!(
            BillplzWebhook::from_fields(&f, WebhookSource::Webhook),
            Err(WebhookError::MissingBillId)
        ));
        let f = fields(&[("id", "  "), ("amount", "100")]);
        assert!(matches!(
            BillplzWebhook::from_fields(&f, WebhookSource::Webhook),
            Err(WebhookError::MissingBillId)
        ));
    }

    #[test]
    fn test_bad_amount_is_invalid_payload() {
        let f = fields(&[("id", "b"), ("amount", "RM10")]);
        assert!(matches!(
            BillplzWebhook::from_fields(&f, WebhookSource::Webhook),
            Err(WebhookError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_status_mapping() {
        let due = fields(&[("id", "b"), ("amount", "1"), ("paid", "false"), ("state", "due")]);
        let deleted = fields(&[("id", "b"), ("amount", "1"), ("paid", "false"), ("state", "deleted")]);
        let due = BillplzWebhook::from_fields(&due, WebhookSource::Webhook).unwrap();
        let deleted = BillplzWebhook::from_fields(&deleted, WebhookSource::Webhook).unwrap();
        assert_eq!(due.target_status(), PaymentStatus::Pending);
        assert_eq!(deleted.target_status(), PaymentStatus::Expired);
        assert_eq!(due.provider_event_id(), "b:due:-");
    }

    #[test]
    fn test_poll_matches_callback_identity() {
        let hook = BillplzWebhook::from_fields(&paid_callback(), WebhookSource::Webhook).unwrap();
        let bill = BillplzBill {
            id: "W_79pJDk".into(),
            collection_id: Some("inbmmepb".into()),
            paid: true,
            state: Some("paid".into()),
            amount: 15_000,
            paid_amount: Some(15_000),
            due_at: Some("2026-01-09".into()),
            paid_at: Some("2026-01-09T08:23:59Z".into()),
            url: None,
        };
        let polled = BillplzWebhook::from_bill(&bill).unwrap();
        assert_eq!(polled.source, WebhookSource::Poll);
        assert_eq!(polled.provider_event_id(), hook.provider_event_id());
        assert_eq!(polled.fingerprint(), hook.fingerprint());
    }

    #[test]
    fn test_fingerprint_changes_with_amount() {
        let a = BillplzWebhook::from_fields(&paid_callback(), WebhookSource::Webhook).unwrap();
        let mut changed = paid_callback();
        changed[4].1 = "15001".into();
        let b = BillplzWebhook::from_fields(&changed, WebhookSource::Webhook).unwrap();
        assert_eq!(a.provider_event_id(), b.provider_event_id());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
