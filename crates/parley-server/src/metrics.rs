//! Metrics collection and export for Parley.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const REGISTRATIONS_TOTAL: &str = "parley_registrations_total";
    pub const PARTICIPANTS_LIVE: &str = "parley_participants_live";
    pub const MESSAGES_TOTAL: &str = "parley_messages_total";
    pub const HEARTBEATS_TOTAL: &str = "parley_heartbeats_total";
    pub const ERRORS_TOTAL: &str = "parley_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::REGISTRATIONS_TOTAL,
        "Total number of successful registrations since server start"
    );
    metrics::describe_gauge!(
        names::PARTICIPANTS_LIVE,
        "Live participants as of the last participant listing"
    );
    metrics::describe_counter!(names::MESSAGES_TOTAL, "Total number of messages sent");
    metrics::describe_counter!(names::HEARTBEATS_TOTAL, "Total number of accepted heartbeats");
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of failed operations");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a successful registration.
pub fn record_registration() {
    counter!(names::REGISTRATIONS_TOTAL).increment(1);
}

/// Update the live participant gauge.
pub fn set_live_participants(count: usize) {
    gauge!(names::PARTICIPANTS_LIVE).set(count as f64);
}

/// Record a sent message.
pub fn record_message(kind: &str) {
    counter!(names::MESSAGES_TOTAL, "type" => kind.to_string()).increment(1);
}

/// Record an accepted heartbeat.
pub fn record_heartbeat() {
    counter!(names::HEARTBEATS_TOTAL).increment(1);
}

/// Record a failed operation.
pub fn record_error(kind: &str) {
    counter!(names::ERRORS_TOTAL, "kind" => kind.to_string()).increment(1);
}
