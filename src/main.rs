//! Madrasah gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client / Billplz ──▶ http server ──▶ attribution (trust boundary)
//!                                │
//!               ┌────────────────┼─────────────────┐
//!               ▼                ▼                 ▼
//!        public tenant     parent / tenant     billplz webhook
//!        (rate limited)    (session auth)      (X-Signature)
//!               │                │                 │
//!               ▼                ▼                 ▼
//!          TenantStore      PaymentStore ◀── reconciliation
//!               └───────┬────────┘          (atomic RPC, fallback)
//!                       ▼
//!          PostgREST endpoint or in-process store
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use madrasah_gateway::config::loader::load_config;
use madrasah_gateway::observability::{logging, metrics};
use madrasah_gateway::payments::BillplzClient;
use madrasah_gateway::store::{MemoryStore, PostgrestStore};
use madrasah_gateway::{GatewayConfig, HttpServer, Services, Shutdown};

#[derive(Debug, Parser)]
#[command(name = "madrasah-gateway", version, about = "Multi-tenant school platform gateway")]
struct Cli {
    /// Path to a TOML configuration file. Defaults plus environment when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn build_services(config: &GatewayConfig) -> Result<Services, Box<dyn std::error::Error>> {
    let mut services = if config.database.is_configured() {
        let store = Arc::new(PostgrestStore::new(&config.database)?);
        tracing::info!(rest_url = %config.database.rest_url, "Using PostgREST store");
        Services {
            payments: store.clone(),
            tenants: store.clone(),
            sessions: store,
            gateway: None,
        }
    } else {
        tracing::warn!("No database configured; using the in-process store, data is not persisted");
        Services::in_memory(Arc::new(MemoryStore::new()))
    };

    if config.billplz.api_key.is_empty() {
        tracing::warn!("BILLPLZ_API_KEY not set; payment intents and bill polling are disabled");
    } else {
        services = services.with_gateway(Arc::new(BillplzClient::new(&config.billplz)?));
    }
    if config.billplz.x_signature_key.is_empty() {
        tracing::warn!("BILLPLZ_X_SIGNATURE_KEY not set; webhooks will be refused");
    }

    Ok(services)
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "madrasah-gateway starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        base_domain = %config.tenant.subdomain_base_domain,
        admin_enabled = config.admin.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let services = build_services(&config)?;
    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, services);
    let mut server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    tokio::select! {
        _ = wait_for_signal() => {
            shutdown.trigger();
            server_task.await??;
        }
        finished = &mut server_task => finished??,
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
