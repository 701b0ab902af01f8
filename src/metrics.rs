//! Prometheus metrics for the gatekeeper and the order API.
//!
//! Metrics are exposed on a dedicated listener (`METRICS_PORT`, disabled
//! when `0`). Recording functions are safe to call without an installed
//! recorder; they become no-ops.
//!
//! # Available Metrics
//!
//! ## Counters
//! - `checkout_gate_decisions_total` - Terminal gate stage per request (label: stage)
//! - `checkout_rate_limit_checks_total` - Rate-limit outcomes (label: outcome)
//! - `checkout_orders_total` - Order writes (label: outcome)
//! - `checkout_registrations_total` - Registration attempts (label: outcome)
//! - `checkout_store_errors_total` - Store failures (label: store)
//!
//! ## Histograms
//! - `checkout_gate_duration_seconds` - Time spent in the gatekeeper
//!
//! ## Gauges
//! - `checkout_store_up` - Last probe result per store (label: store)

use std::net::SocketAddr;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const GATE_DECISIONS_TOTAL: &str = "checkout_gate_decisions_total";
    pub const RATE_LIMIT_CHECKS_TOTAL: &str = "checkout_rate_limit_checks_total";
    pub const ORDERS_TOTAL: &str = "checkout_orders_total";
    pub const REGISTRATIONS_TOTAL: &str = "checkout_registrations_total";
    pub const STORE_ERRORS_TOTAL: &str = "checkout_store_errors_total";
    pub const GATE_DURATION_SECONDS: &str = "checkout_gate_duration_seconds";
    pub const STORE_UP: &str = "checkout_store_up";
}

/// Install the Prometheus exporter and describe every metric.
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        names::GATE_DECISIONS_TOTAL,
        "Requests by terminal gatekeeper stage"
    );
    describe_counter!(
        names::RATE_LIMIT_CHECKS_TOTAL,
        "Fixed-window rate limit checks by outcome"
    );
    describe_counter!(names::ORDERS_TOTAL, "Order writes by outcome");
    describe_counter!(
        names::REGISTRATIONS_TOTAL,
        "Registration attempts by outcome"
    );
    describe_counter!(names::STORE_ERRORS_TOTAL, "Store failures by store");

    describe_histogram!(
        names::GATE_DURATION_SECONDS,
        "Time spent in the rate limiter and authenticator, in seconds"
    );

    describe_gauge!(
        names::STORE_UP,
        "Store reachability from the last probe (1 = up, 0 = down)"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

/// Record the terminal stage a request reached.
pub fn record_gate_decision(stage: &'static str) {
    counter!(names::GATE_DECISIONS_TOTAL, "stage" => stage).increment(1);
}

/// Record a rate limit check (`allowed`, `rejected`, `store_error`).
pub fn record_rate_limit_check(outcome: &'static str) {
    counter!(names::RATE_LIMIT_CHECKS_TOTAL, "outcome" => outcome).increment(1);
}

/// Record an order write (`created`, `conflict`, `updated`, `deleted`).
pub fn record_order(outcome: &'static str) {
    counter!(names::ORDERS_TOTAL, "outcome" => outcome).increment(1);
}

/// Record a registration (`created`, `duplicate`).
pub fn record_registration(outcome: &'static str) {
    counter!(names::REGISTRATIONS_TOTAL, "outcome" => outcome).increment(1);
}

/// Record a store failure (`counter`, `credential`, `order`).
pub fn record_store_error(store: &'static str) {
    counter!(names::STORE_ERRORS_TOTAL, "store" => store).increment(1);
}

pub fn record_gate_duration(duration_secs: f64) {
    histogram!(names::GATE_DURATION_SECONDS).record(duration_secs);
}

/// Update a store reachability gauge.
pub fn set_store_up(store: &'static str, up: bool) {
    gauge!(names::STORE_UP, "store" => store).set(if up { 1.0 } else { 0.0 });
}
