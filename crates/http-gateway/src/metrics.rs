//! Gateway metrics
//!
//! - `gateway_requests_total` (counter): labels `method`, `outcome`
//! - `gateway_request_duration_seconds` (histogram): label `outcome`
//! - `gateway_network_errors_total` (counter): label `error_type`
//!
//! Breaker, dedup and refresh counters are emitted by the resilience crate.
//! Without an installed recorder every call here is a no-op.

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder};

const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

/// Prometheus builder with histogram buckets for the request duration, so it
/// renders `_bucket` lines instead of a summary.
pub fn prometheus_builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full("gateway_request_duration_seconds".to_string()),
        DURATION_BUCKETS,
    )
}

/// Record a finished gateway call. `outcome` is `success` or an error label.
pub fn record_request(method: &str, outcome: &'static str, duration_secs: f64) {
    metrics::counter!("gateway_requests_total", "method" => method.to_string(), "outcome" => outcome)
        .increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "outcome" => outcome)
        .record(duration_secs);
}

/// Record a network-class failure.
pub fn record_network_error(error_type: &'static str) {
    metrics::counter!("gateway_network_errors_total", "error_type" => error_type).increment(1);
}
