//! Metrics collection and exposition.
//!
//! # Metrics
//! - `interceptor_requests_total` (counter): calls by service, operation, outcome
//! - `interceptor_rules_applied_total` (counter): matched rules by direction and type
//! - `interceptor_upstream_errors_total` (counter): backend failures by kind
//! - `interceptor_upstream_duration_seconds` (histogram): backend latency
//! - `interceptor_rules` (gauge): stored rule count

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

use crate::ogc::{Direction, OgcMessage, RuleType};

/// Installs the Prometheus recorder with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, address = %addr, "Failed to install metrics recorder"),
    }
}

/// Records one finished call. `message` is `None` for pass-through traffic.
pub fn record_request(message: Option<&OgcMessage>, outcome: &'static str) {
    let (service, operation) = match message {
        Some(m) => (m.service.as_str(), m.operation.as_str()),
        None => ("none", "none"),
    };
    metrics::counter!(
        "interceptor_requests_total",
        "service" => service,
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_rule_applied(direction: Direction, rule_type: RuleType) {
    metrics::counter!(
        "interceptor_rules_applied_total",
        "direction" => direction.as_str(),
        "rule_type" => rule_type.as_str()
    )
    .increment(1);
}

pub fn record_upstream_error(kind: &'static str) {
    metrics::counter!("interceptor_upstream_errors_total", "kind" => kind).increment(1);
}

pub fn record_upstream_latency(start: Instant) {
    metrics::histogram!("interceptor_upstream_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_rule_count(count: usize) {
    metrics::gauge!("interceptor_rules").set(count as f64);
}
