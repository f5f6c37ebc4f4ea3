//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, route
//! - `gateway_request_duration_seconds` (histogram): end-to-end latency
//! - `gateway_backend_calls_total` (counter): backend calls by backend, status
//! - `gateway_backend_duration_seconds` (histogram): backend latency
//! - `gateway_backend_health` (gauge): 1=healthy, 0.5=degraded, 0=unhealthy
//! - `gateway_circuit_rejections_total` (counter): fail-fast rejections
//! - `gateway_rate_limited_total` (counter): 429s by window
//! - `gateway_phi_detections_total` (counter): PHI hits by risk level
//! - `gateway_audit_sink_failures_total` (counter): audit writes that failed
//!
//! Without an installed recorder every call is a no-op, so tests need no setup.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, route: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("route", route.to_string()),
    ];
    counter!("gateway_requests_total", &labels).increment(1);
    histogram!("gateway_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

pub fn record_backend_call(backend: &str, status: u16, elapsed: Duration) {
    let labels = [("backend", backend.to_string()), ("status", status.to_string())];
    counter!("gateway_backend_calls_total", &labels).increment(1);
    histogram!("gateway_backend_duration_seconds", "backend" => backend.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_backend_health(backend: &str, value: f64) {
    gauge!("gateway_backend_health", "backend" => backend.to_string()).set(value);
}

pub fn record_circuit_rejection(backend: &str) {
    counter!("gateway_circuit_rejections_total", "backend" => backend.to_string()).increment(1);
}

pub fn record_rate_limited(window_secs: u64) {
    counter!("gateway_rate_limited_total", "window" => format!("{window_secs}s")).increment(1);
}

pub fn record_phi_detection(risk_level: &str, approved: bool) {
    counter!(
        "gateway_phi_detections_total",
        "risk_level" => risk_level.to_string(),
        "approved" => approved.to_string()
    )
    .increment(1);
}

pub fn record_audit_sink_failure() {
    counter!("gateway_audit_sink_failures_total").increment(1);
}
