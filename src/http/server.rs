//! HTTP server setup.
//!
//! # Responsibilities
//! - Construct the services from injected stores and the gateway client
//! - Create the Axum router with every public, parent, tenant and admin route
//! - Wire up middleware (request id, trace, timeout, body limit, attribution, metrics)
//! - Serve with graceful shutdown on the lifecycle broadcast

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::admin::setup_admin_router;
use crate::config::GatewayConfig;
use crate::http::handlers::{health, parent, tenant, webhook};
use crate::http::middleware::{attribute_request, track_metrics};
use crate::payments::{
    BillGateway, OnlineEnrollmentService, PaymentIntentService, ReconciliationService,
};
use crate::security::{FixedWindowLimiter, TrustResolver};
use crate::store::{MemoryStore, PaymentStore, SessionStore, TenantStore};

/// Backing collaborators, constructed by the process bootstrap.
#[derive(Clone)]
pub struct Services {
    pub payments: Arc<dyn PaymentStore>,
    pub tenants: Arc<dyn TenantStore>,
    pub sessions: Arc<dyn SessionStore>,
    /// `None` when no Billplz API key is configured.
    pub gateway: Option<Arc<dyn BillGateway>>,
}

impl Services {
    /// Every store backed by one in-process store.
    pub fn in_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            payments: store.clone(),
            tenants: store.clone(),
            sessions: store,
            gateway: None,
        }
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn BillGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }
}

pub struct AppInner {
    pub config: GatewayConfig,
    pub trust: TrustResolver,
    pub limiter: FixedWindowLimiter,
    pub reconciliation: ReconciliationService,
    pub intents: PaymentIntentService,
    pub enrollment: OnlineEnrollmentService,
    pub tenants: Arc<dyn TenantStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub gateway: Option<Arc<dyn BillGateway>>,
    pub started_at: Instant,
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub inner: Arc<AppInner>,
}

impl AppState {
    pub fn new(config: GatewayConfig, services: Services) -> Self {
        let inner = AppInner {
            trust: TrustResolver::from_config(&config.trust),
            limiter: FixedWindowLimiter::new(config.rate_limit.max_tracked_keys),
            reconciliation: ReconciliationService::new(services.payments.clone()),
            intents: PaymentIntentService::new(
                services.payments.clone(),
                services.gateway.clone(),
                config.billplz.bill_ttl_minutes,
            ),
            enrollment: OnlineEnrollmentService::new(services.payments, services.tenants.clone()),
            tenants: services.tenants,
            sessions: services.sessions,
            gateway: services.gateway,
            started_at: Instant::now(),
            config,
        };
        Self {
            inner: Arc::new(inner),
        }
    }
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    pub fn new(config: GatewayConfig, services: Services) -> Self {
        let state = AppState::new(config, services);
        let router = Self::build_router(state.clone());
        Self { router, state }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: AppState) -> Router {
        let config = &state.inner.config;
        let timeout = Duration::from_secs(config.timeouts.request_secs);
        let body_limit = config.security.max_body_size;

        let mut router = Router::new()
            .route("/healthz", get(health::healthz))
            .route("/api/billplz/webhook", post(webhook::billplz_webhook))
            .route("/api/parent/online/pay", post(parent::online_pay))
            .route("/api/parent/payments", post(parent::create_payment))
            .route("/api/tenant/online/move", post(tenant::move_online))
            .route("/api/public/tenant/slug-availability", get(tenant::slug_availability))
            .route("/api/public/tenant/resolve", get(tenant::resolve));

        if config.admin.enabled {
            router = router.merge(setup_admin_router(state.clone()));
        }

        router
            .route_layer(middleware::from_fn(track_metrics))
            .layer(middleware::from_fn_with_state(state.clone(), attribute_request))
            .layer(DefaultBodyLimit::max(body_limit))
            .with_state(state)
            .layer(TimeoutLayer::new(timeout))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Run the server until the shutdown signal fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            admin = self.state.inner.config.admin.enabled,
            gateway = self.state.inner.gateway.is_some(),
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// The assembled router, for driving the server without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn server() -> HttpServer {
        HttpServer::new(GatewayConfig::default(), Services::in_memory(Arc::new(MemoryStore::new())))
    }

    #[tokio::test]
    async fn test_healthz_gets_request_id() {
        let res = server()
            .router()
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().contains_key("x-request-id"));
        let body = to_bytes(res.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], br#"{"ok":true}"#);
    }

    #[tokio::test]
    async fn test_admin_not_mounted_by_default() {
        let res = server()
            .router()
            .oneshot(Request::get("/admin/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let mut config = GatewayConfig::default();
        config.security.max_body_size = 16;
        let server = HttpServer::new(config, Services::in_memory(Arc::new(MemoryStore::new())));

        let res = server
            .router()
            .oneshot(
                Request::post("/api/billplz/webhook")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from("id=".to_string() + &"a".repeat(64)))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_incoming_request_id_is_kept() {
        let res = server()
            .router()
            .oneshot(
                Request::get("/healthz")
                    .header("x-request-id", "req-from-edge")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.headers()["x-request-id"], "req-from-edge");
    }
}
