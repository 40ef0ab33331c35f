//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_exchanges_total` (counter): exchanges by decision, status
//! - `gateway_exchange_duration_seconds` (histogram): upstream latency
//! - `gateway_admission_wait_seconds` (histogram): rate limiter delay
//! - `gateway_externalized_total` / `gateway_externalized_bytes_total` (counters)
//! - `gateway_routed_total` (counter): messages by sink
//!
//! Recording is a no-op until a recorder is installed, so library users and
//! tests pay nothing unless `init_metrics` ran.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Install the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_exchange(decision: &str, status: Option<u16>, elapsed: Duration) {
    let status = status.map_or_else(|| "none".to_string(), |s| s.to_string());
    counter!("gateway_exchanges_total", "decision" => decision.to_string(), "status" => status)
        .increment(1);
    histogram!("gateway_exchange_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_admission_wait(wait: Duration) {
    histogram!("gateway_admission_wait_seconds").record(wait.as_secs_f64());
}

pub fn record_externalized(bytes: usize) {
    counter!("gateway_externalized_total").increment(1);
    counter!("gateway_externalized_bytes_total").increment(bytes as u64);
}

pub fn record_routed(sink: &'static str) {
    counter!("gateway_routed_total", "sink" => sink).increment(1);
}
