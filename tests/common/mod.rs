//! Shared harness for integration tests: a real server on an ephemeral port
//! over the in-process store.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::net::TcpListener;
use uuid::Uuid;

use madrasah_gateway::config::GatewayConfig;
use madrasah_gateway::payments::{BillGateway, BillplzBill, CreateBill, GatewayError};
use madrasah_gateway::payments::types::{PaymentRecord, PaymentStatus};
use madrasah_gateway::security::signature;
use madrasah_gateway::store::MemoryStore;
use madrasah_gateway::tenant::{Role, TenantRecord, TenantUser};
use madrasah_gateway::{HttpServer, Services, Shutdown};

pub const SIGNATURE_KEY: &str = "test-x-signature-key";
pub const ADMIN_KEY: &str = "test-admin-key";
pub const BASE_DOMAIN: &str = "madrasah.test";
pub const TRUSTED_HOP: &str = "10.0.0.9";
pub const SLUG_LIMIT: u32 = 3;

/// Gateway double: bills are created in memory and can be planted for polls.
#[derive(Default)]
pub struct StubGateway {
    bills: Mutex<HashMap<String, BillplzBill>>,
}

impl StubGateway {
    pub fn plant(&self, bill: BillplzBill) {
        self.bills.lock().unwrap().insert(bill.id.clone(), bill);
    }
}

#[async_trait]
impl BillGateway for StubGateway {
    async fn create_bill(&self, bill: &CreateBill) -> Result<BillplzBill, GatewayError> {
        let created = BillplzBill {
            id: format!("bill_{}", &bill.reference[..8]),
            collection_id: Some("col_test".into()),
            paid: false,
            state: Some("due".into()),
            amount: bill.amount_cents,
            paid_amount: None,
            due_at: None,
            paid_at: None,
            url: None,
        };
        self.plant(created.clone());
        Ok(created)
    }

    async fn get_bill(&self, bill_id: &str) -> Result<BillplzBill, GatewayError> {
        self.bills
            .lock()
            .unwrap()
            .get(bill_id)
            .cloned()
            .ok_or_else(|| GatewayError::Status {
                status: 404,
                body: "not found".into(),
            })
    }

    fn bill_url(&self, bill_id: &str) -> Option<String> {
        Some(format!("https://billplz.test/bills/{bill_id}"))
    }
}

pub struct TestApp {
    pub addr: SocketAddr,
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<StubGateway>,
    pub client: reqwest::Client,
    shutdown: Shutdown,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn stop(&self) {
        self.shutdown.trigger();
    }
}

pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.trust.rate_limit_trusted_proxy_ips = vec![TRUSTED_HOP.into()];
    config.trust.host_trusted_proxy_ips = vec![TRUSTED_HOP.into()];
    config.rate_limit.slug_availability_limit = SLUG_LIMIT;
    config.tenant.subdomain_base_domain = BASE_DOMAIN.into();
    config.tenant.marketing_hosts = vec![BASE_DOMAIN.into(), format!("www.{BASE_DOMAIN}")];
    config.billplz.x_signature_key = SIGNATURE_KEY.into();
    config.admin.enabled = true;
    config.admin.api_key = ADMIN_KEY.into();
    config
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(test_config()).await
}

pub async fn spawn_app_with(config: GatewayConfig) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(StubGateway::default());
    let services = Services::in_memory(store.clone()).with_gateway(gateway.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, services);
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });

    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap();

    TestApp {
        addr,
        store,
        gateway,
        client,
        shutdown,
    }
}

pub async fn seed_tenant(store: &MemoryStore, slug: &str, plan: Option<&str>) -> TenantRecord {
    let tenant = TenantRecord {
        id: Uuid::new_v4(),
        slug: slug.into(),
        name: format!("Sekolah {slug}"),
        plan_code: plan.map(str::to_string),
        custom_domain: None,
    };
    store.seed_tenant(tenant.clone()).await;
    tenant
}

/// A signed-in user; returns the bearer token.
pub async fn seed_user(store: &MemoryStore, tenant_id: Uuid, role: Role) -> (String, TenantUser) {
    let user = TenantUser {
        user_id: Uuid::new_v4(),
        tenant_id,
        role,
        parent_id: (role == Role::Parent).then(Uuid::new_v4),
    };
    let token = format!("session-{}", user.user_id);
    store.seed_session(token.clone(), user.clone()).await;
    (token, user)
}

pub async fn seed_initiated_payment(store: &MemoryStore, tenant_id: Uuid, bill_id: &str, amount: i64) -> PaymentRecord {
    let now = Utc::now();
    let payment = PaymentRecord {
        id: Uuid::new_v4(),
        tenant_id,
        parent_id: Uuid::new_v4(),
        provider_id: "billplz".into(),
        status: PaymentStatus::Initiated,
        total_amount_cents: amount,
        merchant_fee_cents: 0,
        billplz_id: Some(bill_id.into()),
        payable_months: vec!["2026-01".into()],
        idempotency_key: Some(format!("key-{bill_id}")),
        paid_at: None,
        expires_at: None,
        created_at: now,
        updated_at: now,
    };
    store.seed_payment(payment.clone()).await;
    payment
}

/// Form body for a Billplz callback, signed with `key`.
pub fn signed_callback(pairs: &[(&str, &str)], key: &str) -> String {
    let mut fields: Vec<(String, String)> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let sig = signature::sign(&fields, key).unwrap();
    fields.push(("x_signature".into(), sig));
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(fields)
        .finish()
}

pub fn paid_callback(bill_id: &str, amount: i64) -> String {
    let amount = amount.to_string();
    signed_callback(
        &[
            ("id", bill_id),
            ("collection_id", "col_test"),
            ("paid", "true"),
            ("state", "paid"),
            ("amount", amount.as_str()),
            ("paid_amount", amount.as_str()),
            ("paid_at", "2026-01-09 16:23:59 +0800"),
        ],
        SIGNATURE_KEY,
    )
}
