//! # Metrics
//!
//! Gateway metrics recorded through the `metrics` facade and exported in Prometheus
//! format. Without an installed recorder every call here is a no-op, which keeps
//! library users and tests free of global state.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::ServiceStatus;

const DURATION_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Install the global Prometheus recorder and return the render handle
pub fn install_prometheus_recorder() -> GatewayResult<PrometheusHandle> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Suffix("duration_seconds".to_string()), DURATION_BUCKETS)
        .map_err(|e| GatewayError::config(format!("Invalid metric buckets: {}", e)))?
        .install_recorder()
        .map_err(|e| GatewayError::config(format!("Failed to install metrics recorder: {}", e)))
}

/// Record a proxied call that reached the upstream
pub fn record_route(service: &str, endpoint: &str, status_code: u16, duration: Duration) {
    counter!(
        "gateway_routed_requests_total",
        "service" => service.to_string(),
        "endpoint" => endpoint.to_string(),
        "status" => status_code.to_string()
    )
    .increment(1);

    histogram!(
        "gateway_route_duration_seconds",
        "service" => service.to_string(),
        "endpoint" => endpoint.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a routing failure by error kind
pub fn record_route_failure(service: &str, kind: &'static str) {
    counter!(
        "gateway_route_failures_total",
        "service" => service.to_string(),
        "kind" => kind
    )
    .increment(1);
}

/// Record the outcome of a health probe
pub fn record_probe(service: &str, status: ServiceStatus) {
    counter!(
        "gateway_health_probes_total",
        "service" => service.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}
