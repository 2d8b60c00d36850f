//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status
//! - `gateway_request_duration_seconds` (histogram): latency by method
//! - `gateway_trace_source_total` (counter): resolved trace context by source
//! - `gateway_auth_outcomes_total` (counter): security decisions by outcome
//! - `gateway_rate_limited_total` (counter): requests rejected with 429
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so tests need no setup
//! - The Prometheus exporter serves its own scrape listener

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::observability::tracing::TraceSource;

const REQUESTS_TOTAL: &str = "gateway_requests_total";
const REQUEST_DURATION: &str = "gateway_request_duration_seconds";
const TRACE_SOURCE_TOTAL: &str = "gateway_trace_source_total";
const AUTH_OUTCOMES_TOTAL: &str = "gateway_auth_outcomes_total";
const RATE_LIMITED_TOTAL: &str = "gateway_rate_limited_total";

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    describe();
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

fn describe() {
    describe_counter!(REQUESTS_TOTAL, "Requests completed by method and status");
    describe_histogram!(REQUEST_DURATION, Unit::Seconds, "Request latency");
    describe_counter!(TRACE_SOURCE_TOTAL, "Trace contexts resolved by source");
    describe_counter!(AUTH_OUTCOMES_TOTAL, "Authentication and permission outcomes");
    describe_counter!(RATE_LIMITED_TOTAL, "Requests rejected by admission control");
}

pub fn record_request(method: &str, status: u16, elapsed: Duration) {
    counter!(REQUESTS_TOTAL, "method" => method.to_string(), "status" => status.to_string())
        .increment(1);
    metrics::histogram!(REQUEST_DURATION, "method" => method.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_trace_source(source: TraceSource) {
    counter!(TRACE_SOURCE_TOTAL, "source" => source.as_str()).increment(1);
}

pub fn record_auth_outcome(outcome: &'static str) {
    counter!(AUTH_OUTCOMES_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_rate_limited() {
    counter!(RATE_LIMITED_TOTAL).increment(1);
}
