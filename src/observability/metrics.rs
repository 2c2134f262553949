//! Metrics collection and exposition.
//!
//! # Metrics
//! - `devicehub_events_total` (counter): stream entries by `operation`, `outcome`
//!   (`handled`, `ignored`, `failed`)
//! - `devicehub_events_acked_total` (counter): entries acknowledged on the log
//! - `devicehub_stream_read_errors_total` (counter): failed log reads
//! - `devicehub_listener_stops_total` (counter): listener stops by `listener`, `outcome`
//! - `devicehub_configs` (gauge): bootstrap configurations held

use std::net::SocketAddr;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    describe();
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

fn describe() {
    describe_counter!("devicehub_events_total", "Stream entries processed by operation and outcome");
    describe_counter!("devicehub_events_acked_total", "Stream entries acknowledged");
    describe_counter!("devicehub_stream_read_errors_total", "Failed reads from the event log");
    describe_counter!("devicehub_listener_stops_total", "Listener stop attempts by outcome");
    describe_gauge!("devicehub_configs", "Bootstrap configurations in the store");
}

pub fn record_event(operation: &str, outcome: &'static str) {
    let operation = if operation.is_empty() { "none" } else { operation };
    counter!("devicehub_events_total", "operation" => operation.to_string(), "outcome" => outcome)
        .increment(1);
}

pub fn record_ack(count: u64) {
    counter!("devicehub_events_acked_total").increment(count);
}

pub fn record_read_error() {
    counter!("devicehub_stream_read_errors_total").increment(1);
}

pub fn record_listener_stop(listener: &str, success: bool) {
    let outcome = if success { "ok" } else { "error" };
    counter!("devicehub_listener_stops_total", "listener" => listener.to_string(), "outcome" => outcome)
        .increment(1);
}

pub fn record_config_count(count: usize) {
    gauge!("devicehub_configs").set(count as f64);
}
