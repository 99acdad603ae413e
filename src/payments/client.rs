//! Outbound Billplz v3 API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use url::Url;

use crate::config::BillplzConfig;
use crate::payments::billplz::BillplzBill;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("billplz request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("billplz responded with {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid billplz url: {0}")]
    InvalidUrl(String),
}

/// What a bill is created for.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateBill {
    pub payer_name: String,
    pub payer_email: String,
    pub amount_cents: i64,
    pub description: String,
    /// Our payment id, echoed back by Billplz as `reference_1`.
    pub reference: String,
}

/// Seam over the payment gateway so flows can be exercised without it.
#[async_trait]
pub trait BillGateway: Send + Sync {
    async fn create_bill(&self, bill: &CreateBill) -> Result<BillplzBill, GatewayError>;

    async fn get_bill(&self, bill_id: &str) -> Result<BillplzBill, GatewayError>;

    /// Public payment page for a bill.
    fn bill_url(&self, bill_id: &str) -> Option<String>;
}

/// Billplz API client (basic auth with the API key as user name).
pub struct BillplzClient {
    client: Client,
    base_url: Url,
    api_key: String,
    collection_id: String,
    callback_url: String,
}

impl BillplzClient {
    pub fn new(config: &BillplzConfig) -> Result<Self, GatewayError> {
        let base_url =
            Url::parse(&config.api_base_url).map_err(|e| GatewayError::InvalidUrl(e.to_string()))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
            collection_id: config.collection_id.clone(),
            callback_url: config.callback_url.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
        self.base_url
            .join(path)
            .map_err(|e| GatewayError::InvalidUrl(e.to_string()))
    }

    async fn bill_from(response: reqwest::Response) -> Result<BillplzBill, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl BillGateway for BillplzClient {
    async fn create_bill(&self, bill: &CreateBill) -> Result<BillplzBill, GatewayError> {
        let url = self.endpoint("api/v3/bills")?;
        let amount = bill.amount_cents.to_string();
        let form = [
            ("collection_id", self.collection_id.as_str()),
            ("email", bill.payer_email.as_str()),
            ("name", bill.payer_name.as_str()),
            ("amount", amount.as_str()),
            ("callback_url", self.callback_url.as_str()),
            ("description", bill.description.as_str()),
            ("reference_1_label", "Payment ID"),
            ("reference_1", bill.reference.as_str()),
        ];

        let response = self
            .client
            .post(url)
            .basic_auth(&self.api_key, None::<&str>)
            .form(&form)
            .send()
            .await?;
        Self::bill_from(response).await
    }

    async fn get_bill(&self, bill_id: &str) -> Result<BillplzBill, GatewayError> {
        let url = self.endpoint(&format!("api/v3/bills/{bill_id}"))?;
        let response = self
            .client
            .get(url)
            .basic_auth(&self.api_key, None::<&str>)
            .send()
            .await?;
        Self::bill_from(response).await
    }

    fn bill_url(&self, bill_id: &str) -> Option<String> {
        self.endpoint(&format!("bills/{bill_id}")).ok().map(String::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BillplzConfig {
        BillplzConfig {
            api_base_url: "https://www.billplz-sandbox.com/".into(),
            api_key: "key".into(),
            collection_id: "inbmmepb".into(),
            ..BillplzConfig::default()
        }
    }

    #[test]
    fn test_bill_url() {
        let client = BillplzClient::new(&config()).unwrap();
        assert_eq!(
            client.bill_url("W_79pJDk").as_deref(),
            Some("https://www.billplz-sandbox.com/bills/W_79pJDk")
        );
    }

    #[test]
    fn test_rejects_bad_base_url() {
        let mut cfg = config();
        cfg.api_base_url = "::not-a-url".into();
        assert!(matches!(BillplzClient::new(&cfg), Err(GatewayError::InvalidUrl(_))));
    }

    #[test]
    fn test_bill_json_decodes() {
        let bill: BillplzBill = serde_json::from_str(
            r#"{"id":"8X0Iyzaw","collection_id":"inbmmepb","paid":false,"state":"due","amount":200,"paid_amount":0,"due_at":"2026-12-31","email":"api@billplz.com","mobile":null,"name":"MICHAEL API V3","url":"https://www.billplz.com/bills/8X0Iyzaw","paid_at":null}"#,
        )
        .unwrap();
        assert_eq!(bill.id, "8X0Iyzaw");
        assert_eq!(bill.amount, 200);
        assert!(!bill.paid);
    }
}
