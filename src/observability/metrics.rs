//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by matched route and status
//! - `gateway_rate_limited_total` (counter): denials by limiter scope
//! - `gateway_reconciliation_total` (counter): webhook outcomes by path (atomic/fallback)
//! - `gateway_webhook_rejected_total` (counter): webhooks refused before reconciliation

use std::net::SocketAddr;

use metrics::counter;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint. Failure is logged, never fatal.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to start metrics exporter"),
    }
}

pub fn record_request(route: &str, status: u16) {
    counter!(
        "gateway_requests_total",
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_rate_limited(scope: &'static str) {
    counter!("gateway_rate_limited_total", "scope" => scope).increment(1);
}

pub fn record_reconciliation(outcome: &'static str, path: &'static str) {
    counter!(
        "gateway_reconciliation_total",
        "outcome" => outcome,
        "path" => path
    )
    .increment(1);
}

pub fn record_webhook_rejected(reason: &'static str) {
    counter!("gateway_webhook_rejected_total", "reason" => reason).increment(1);
}
