//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_requests_total` (counter): relay calls by outcome kind and status
//! - `relay_request_duration_seconds` (histogram): whole relay call latency
//! - `relay_upstream_duration_seconds` (histogram): outbound call latency
//! - `relay_rate_limited_total` (counter): calls denied by the rate limiter
//! - `relay_blocked_targets_total` (counter): destinations refused by rule
//!
//! # Design Decisions
//! - Recording is a no-op until `init_metrics` installs the exporter
//! - Blocked-target labels name the rule; they never leave the server

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::security::BlockedTarget;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_relay(kind: &'static str, status: u16, start: Instant) {
    counter!("relay_requests_total", "outcome" => kind, "status" => status.to_string())
        .increment(1);
    histogram!("relay_request_duration_seconds", "outcome" => kind)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_upstream_duration(start: Instant) {
    histogram!("relay_upstream_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited() {
    counter!("relay_rate_limited_total").increment(1);
}

pub fn record_blocked_target(reason: &BlockedTarget) {
    let rule = match reason {
        BlockedTarget::Unparsable | BlockedTarget::MissingHost => "unparsable",
        BlockedTarget::Scheme(_) => "scheme",
        BlockedTarget::Loopback(_) => "loopback",
        BlockedTarget::Ipv4Literal(_) => "ipv4_literal",
        BlockedTarget::PrivateRange(_) => "private_range",
    };
    counter!("relay_blocked_targets_total", "rule" => rule).increment(1);
}
