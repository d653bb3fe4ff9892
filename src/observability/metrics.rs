//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, upstream
//! - `gateway_request_duration_seconds` (histogram): end-to-end latency
//! - `gateway_rate_limited_total` (counter): rejections by identifier scope
//! - `gateway_rate_limit_fail_open_total` (counter): store failures that let traffic through
//! - `gateway_route_decisions_total` (counter): router outcomes
//! - `gateway_instance_health` (gauge): 1=healthy, 0=unhealthy per instance
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so tests need no setup
//! - No request ids or caller ids in labels
//! - Methods outside the standard set are recorded as `other`
//! - `upstream` and `instance` labels grow with the registered instance set,
//!   which is bounded by operators rather than by callers

use std::net::SocketAddr;
use std::time::Instant;

use axum::http::Method;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Label for a request method. Extension methods collapse to `other`.
pub fn method_label(method: &Method) -> &'static str {
    match *method {
        Method::GET => "GET",
        Method::POST => "POST",
        Method::PUT => "PUT",
        Method::DELETE => "DELETE",
        Method::PATCH => "PATCH",
        Method::HEAD => "HEAD",
        Method::OPTIONS => "OPTIONS",
        Method::CONNECT => "CONNECT",
        Method::TRACE => "TRACE",
        _ => "other",
    }
}

/// Record a completed gateway request.
pub fn record_request(method: &Method, status: u16, upstream: &str, start: Instant) {
    counter!(
        "gateway_requests_total",
        "method" => method_label(method),
        "status" => status.to_string(),
        "upstream" => upstream.to_string()
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds", "upstream" => upstream.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// Record a rate-limit rejection.
pub fn record_rate_limited(scope: &str) {
    counter!("gateway_rate_limited_total", "scope" => scope.to_string()).increment(1);
}

/// Record a rate-limit decision taken without the store.
pub fn record_rate_limit_fail_open() {
    counter!("gateway_rate_limit_fail_open_total").increment(1);
}

/// Record the router's decision for one request.
pub fn record_route_decision(outcome: &'static str) {
    counter!("gateway_route_decisions_total", "outcome" => outcome).increment(1);
}

/// Record the probed health of one instance.
pub fn record_instance_health(service: &str, instance: &str, healthy: bool) {
    gauge!(
        "gateway_instance_health",
        "service" => service.to_string(),
        "instance" => instance.to_string()
    )
    .set(if healthy { 1.0 } else { 0.0 });
}
