//! Prometheus metrics
//!
//! The `record_*` helpers are no-ops until a recorder is installed, so the
//! core calls them unconditionally.

use crate::domain::shared::{GatewayError, Result};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Install the Prometheus recorder and serve `/metrics` on `listen`.
/// Must run inside a tokio runtime.
pub fn init_metrics(listen: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(listen)
        .install()
        .map_err(|e| GatewayError::Config(format!("Failed to install metrics exporter: {}", e)))?;

    describe_metrics();
    info!("Prometheus metrics exporter listening on {}", listen);
    Ok(())
}

fn describe_metrics() {
    describe_counter!(
        "gb_datagrams_received_total",
        "Total number of UDP datagrams received"
    );
    describe_counter!(
        "gb_datagrams_dropped_total",
        "Datagrams dropped before dispatch, by reason"
    );
    describe_counter!(
        "gb_registrations_total",
        "REGISTER requests with a non-zero expiry"
    );
    describe_counter!(
        "gb_unregistrations_total",
        "REGISTER requests with a zero expiry"
    );
    describe_counter!("gb_keepalives_total", "Keepalive MESSAGEs received");
    describe_counter!("gb_catalog_queries_total", "Catalog queries sent to devices");
    describe_counter!(
        "gb_catalog_responses_total",
        "Catalog responses matched to a query, by status class"
    );
    describe_counter!("gb_send_failures_total", "Failed datagram sends");
    describe_gauge!("gb_device_sessions", "Known device sessions");
}

pub fn record_datagram_received() {
    counter!("gb_datagrams_received_total").increment(1);
}

pub fn record_datagram_dropped(reason: &'static str) {
    counter!("gb_datagrams_dropped_total", "reason" => reason).increment(1);
}

pub fn record_registration() {
    counter!("gb_registrations_total").increment(1);
}

pub fn record_unregistration() {
    counter!("gb_unregistrations_total").increment(1);
}

pub fn record_keepalive() {
    counter!("gb_keepalives_total").increment(1);
}

pub fn record_catalog_query() {
    counter!("gb_catalog_queries_total").increment(1);
}

pub fn record_catalog_response(status: u16) {
    let class = match status {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        500..=599 => "5xx",
        _ => "6xx",
    };
    counter!("gb_catalog_responses_total", "class" => class).increment(1);
}

pub fn record_send_failure() {
    counter!("gb_send_failures_total").increment(1);
}

pub fn update_device_sessions(count: usize) {
    gauge!("gb_device_sessions").set(count as f64);
}
