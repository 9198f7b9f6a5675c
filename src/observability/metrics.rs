//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): processed records by type, status
//! - `gateway_request_duration_seconds` (histogram): pipeline latency
//! - `gateway_rejections_total` (counter): business errors by kind
//! - `gateway_rate_limited_total` (counter): rate limiter rejections
//! - `gateway_active_connections` (gauge): current connection count
//! - `gateway_registered_connectors` (gauge): connectors in the registry
//!
//! # Design Decisions
//! - Request type label is normalised so clients cannot inflate cardinality
//! - Recording without an installed exporter is a no-op

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

fn type_label(request_type: Option<&str>) -> &'static str {
    match request_type {
        Some("auth") => "auth",
        Some("query") => "query",
        Some(_) => "other",
        None => "none",
    }
}

/// Record one processed record.
pub fn record_request(request_type: Option<&str>, status: &'static str, start: Instant) {
    let request_type = type_label(request_type);
    ::metrics::counter!("gateway_requests_total", "type" => request_type, "status" => status)
        .increment(1);
    ::metrics::histogram!("gateway_request_duration_seconds", "type" => request_type)
        .record(start.elapsed().as_secs_f64());
}

/// Record a business-logic rejection.
pub fn record_rejection(kind: &'static str) {
    ::metrics::counter!("gateway_rejections_total", "kind" => kind).increment(1);
}

pub fn record_rate_limited() {
    ::metrics::counter!("gateway_rate_limited_total").increment(1);
}

pub fn record_connection_opened() {
    ::metrics::gauge!("gateway_active_connections").increment(1.0);
}

pub fn record_connection_closed() {
    ::metrics::gauge!("gateway_active_connections").decrement(1.0);
}

pub fn record_registered_connectors(count: usize) {
    ::metrics::gauge!("gateway_registered_connectors").set(count as f64);
}
