//! PostgREST-compatible HTTP store.
//!
//! Tables are read and written under `rest/v1/<table>`, stored procedures are
//! called as `POST rest/v1/rpc/<name>` with `p_`-prefixed arguments. Every
//! request carries the service-role key as both `apikey` and bearer token.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;
use uuid::Uuid;

use super::{
    PaymentStore, SessionStore, StoreError, TenantStore, MOVE_ONLINE_RPC, ONLINE_PAY_RPC,
    WEBHOOK_RPC,
};
use crate::config::DatabaseConfig;
use crate::payments::types::{
    MoveOnlineApplyRow, MoveOnlineCommand, NewPayment, NewWebhookEvent, OnlinePayCommand,
    OnlinePayRow, PaymentRecord, PaymentUpdate, WebhookCommand, WebhookEvent, WebhookRpcRow,
};
use crate::tenant::types::{TenantRecord, TenantUser};

const SESSION_RPC: &str = "resolve_tenant_session";
const TENANT_COLUMNS: &str = "id,slug,name,plan_code,custom_domain";

/// Error body PostgREST returns on failure.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    hint: Option<String>,
}

/// Decode a failed response into a `StoreError`.
///
/// Bodies that are not PostgREST JSON keep their text as the message so the
/// classifier can still pattern-match on it.
pub fn decode_error_body(status: StatusCode, body: &str) -> StoreError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) if parsed.code.is_some() || parsed.message.is_some() => StoreError {
            code: parsed.code,
            message: parsed.message,
            details: match (parsed.details, parsed.hint) {
                (Some(d), Some(h)) => Some(format!("{d} {h}")),
                (d, h) => d.or(h),
            },
        },
        _ => {
            let text = body.trim();
            let message = if text.is_empty() {
                format!("store responded with {status}")
            } else {
                format!("store responded with {status}: {text}")
            };
            StoreError::other(message)
        }
    }
}

/// Parse the total from a `Content-Range` header (`0-9/42`, `*/0`).
pub fn content_range_total(header: &str) -> Option<u32> {
    header.rsplit_once('/')?.1.trim().parse().ok()
}

/// HTTP client for the backing database's REST gateway.
#[derive(Debug, Clone)]
pub struct PostgrestStore {
    client: Client,
    base_url: Url,
    service_key: String,
}

impl PostgrestStore {
    pub fn new(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let mut base = config.rest_url.trim_end_matches('/').to_string();
        base.push_str("/rest/v1/");
        let base_url = Url::parse(&base)
            .map_err(|e| StoreError::other(format!("invalid database rest_url: {e}")))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| StoreError::other(format!("failed to build database client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            service_key: config.service_role_key.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, StoreError> {
        self.base_url
            .join(path)
            .map_err(|e| StoreError::other(format!("invalid store path {path}: {e}")))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, StoreError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| StoreError::other(format!("database request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(decode_error_body(status, &body))
    }

    async fn decode<R: DeserializeOwned>(response: reqwest::Response) -> Result<R, StoreError> {
        response
            .json()
            .await
            .map_err(|e| StoreError::other(format!("failed to decode store response: {e}")))
    }

    /// Call a stored procedure that returns a set of rows.
    async fn rpc<R: DeserializeOwned>(
        &self,
        routine: &str,
        args: serde_json::Value,
    ) -> Result<Vec<R>, StoreError> {
        let url = self.endpoint(&format!("rpc/{routine}"))?;
        let response = self.send(self.client.post(url).json(&args)).await?;
        Self::decode(response).await
    }

    async fn select<R: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(&str, String)],
    ) -> Result<Vec<R>, StoreError> {
        let url = self.endpoint(table)?;
        let response = self.send(self.client.get(url).query(filters)).await?;
        Self::decode(response).await
    }

    async fn insert<B: Serialize, R: DeserializeOwned>(
        &self,
        table: &str,
        body: &B,
    ) -> Result<R, StoreError> {
        let url = self.endpoint(table)?;
        let request = self
            .client
            .post(url)
            .header("Prefer", "return=representation")
            .json(body);
        let rows: Vec<R> = Self::decode(self.send(request).await?).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::other(format!("insert into {table} returned no row")))
    }
}

fn single<R>(rows: Vec<R>, routine: &str) -> Result<R, StoreError> {
    rows.into_iter()
        .next()
        .ok_or_else(|| StoreError::other(format!("{routine} returned no rows")))
}

#[async_trait]
impl PaymentStore for PostgrestStore {
    async fn process_billplz_webhook(
        &self,
        cmd: &WebhookCommand,
    ) -> Result<Vec<WebhookRpcRow>, StoreError> {
        self.rpc(
            WEBHOOK_RPC,
            json!({
                "p_tenant_id": cmd.tenant_id,
                "p_billplz_id": cmd.billplz_id,
                "p_provider_event_id": cmd.provider_event_id,
                "p_fingerprint": cmd.fingerprint,
                "p_amount_cents": cmd.amount_cents,
                "p_paid": cmd.paid,
                "p_state": cmd.state,
                "p_target_status": cmd.target_status,
                "p_due_at": cmd.due_at,
                "p_paid_at": cmd.paid_at,
                "p_source": cmd.source,
                "p_event_type": cmd.event_type,
                "p_payload": cmd.payload,
            }),
        )
        .await
    }

    async fn get_payment_by_billplz_id(
        &self,
        tenant_id: Option<Uuid>,
        billplz_id: &str,
    ) -> Result<Option<PaymentRecord>, StoreError> {
        let mut filters = vec![("billplz_id", format!("eq.{billplz_id}"))];
        if let Some(tenant_id) = tenant_id {
            filters.push(("tenant_id", format!("eq.{tenant_id}")));
        }
        filters.push(("limit", "1".to_string()));
        let rows: Vec<PaymentRecord> = self.select("payments", &filters).await?;
        Ok(rows.into_iter().next())
    }

    async fn get_payment_by_idempotency_key(
        &self,
        tenant_id: Uuid,
        key: &str,
    ) -> Result<Option<PaymentRecord>, StoreError> {
        let filters = [
            ("tenant_id", format!("eq.{tenant_id}")),
            ("idempotency_key", format!("eq.{key}")),
            ("limit", "1".to_string()),
        ];
        let rows: Vec<PaymentRecord> = self.select("payments", &filters).await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_payment(&self, payment: &NewPayment) -> Result<PaymentRecord, StoreError> {
        self.insert("payments", payment).await
    }

    async fn update_payment(
        &self,
        payment_id: Uuid,
        update: &PaymentUpdate,
    ) -> Result<PaymentRecord, StoreError> {
        let url = self.endpoint("payments")?;
        let request = self
            .client
            .patch(url)
            .query(&[("id", format!("eq.{payment_id}"))])
            .header("Prefer", "return=representation")
            .json(update);
        let rows: Vec<PaymentRecord> = Self::decode(self.send(request).await?).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::new("PGRST116", "update matched no payment row"))
    }

    async fn record_payment_event(
        &self,
        event: &NewWebhookEvent,
    ) -> Result<WebhookEvent, StoreError> {
        self.insert("payment_webhook_events", event).await
    }

    async fn pay_online_claim(&self, cmd: &OnlinePayCommand) -> Result<OnlinePayRow, StoreError> {
        let rows = self
            .rpc(
                ONLINE_PAY_RPC,
                json!({
                    "p_tenant_id": cmd.tenant_id,
                    "p_parent_id": cmd.parent_id,
                    "p_claim_id": cmd.claim_id,
                    "p_payment_reference": cmd.payment_reference,
                }),
            )
            .await?;
        single(rows, ONLINE_PAY_RPC)
    }

    async fn apply_move_online(
        &self,
        cmd: &MoveOnlineCommand,
    ) -> Result<Vec<MoveOnlineApplyRow>, StoreError> {
        self.rpc(
            MOVE_ONLINE_RPC,
            json!({
                "p_tenant_id": cmd.tenant_id,
                "p_staging_id": cmd.staging_id,
                "p_student_id": cmd.student_id,
            }),
        )
        .await
    }
}

#[async_trait]
impl TenantStore for PostgrestStore {
    async fn slug_exists(&self, slug: &str) -> Result<bool, StoreError> {
        Ok(self.get_tenant_by_slug(slug).await?.is_some())
    }

    async fn get_tenant(&self, tenant_id: Uuid) -> Result<Option<TenantRecord>, StoreError> {
        let filters = [
            ("id", format!("eq.{tenant_id}")),
            ("select", TENANT_COLUMNS.to_string()),
        ];
        let rows: Vec<TenantRecord> = self.select("tenants", &filters).await?;
        Ok(rows.into_iter().next())
    }

    async fn get_tenant_by_slug(&self, slug: &str) -> Result<Option<TenantRecord>, StoreError> {
        let filters = [
            ("slug", format!("eq.{slug}")),
            ("select", TENANT_COLUMNS.to_string()),
        ];
        let rows: Vec<TenantRecord> = self.select("tenants", &filters).await?;
        Ok(rows.into_iter().next())
    }

    async fn get_tenant_by_domain(
        &self,
        domain: &str,
    ) -> Result<Option<TenantRecord>, StoreError> {
        let filters = [
            ("custom_domain", format!("ilike.{domain}")),
            ("select", TENANT_COLUMNS.to_string()),
        ];
        let rows: Vec<TenantRecord> = self.select("tenants", &filters).await?;
        Ok(rows.into_iter().next())
    }

    async fn count_active_students(&self, tenant_id: Uuid) -> Result<u32, StoreError> {
        let url = self.endpoint("students")?;
        let request = self
            .client
            .head(url)
            .query(&[
                ("tenant_id", format!("eq.{tenant_id}")),
                ("status", "eq.active".to_string()),
                ("select", "id".to_string()),
            ])
            .header("Prefer", "count=exact");
        let response = self.send(request).await?;
        response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(content_range_total)
            .ok_or_else(|| StoreError::other("student count missing from content-range"))
    }
}

#[async_trait]
impl SessionStore for PostgrestStore {
    async fn resolve_session(&self, token: &str) -> Result<Option<TenantUser>, StoreError> {
        let rows: Vec<TenantUser> = self.rpc(SESSION_RPC, json!({ "p_token": token })).await?;
        Ok(rows.into_iter().next())
    }
}
