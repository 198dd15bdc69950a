//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `login_attempts_total` (counter): every connection reaching admission
//! - `active_queue_size` (gauge): queue depth seen at the latest admission check
//! - `login_rejected_total` (counter): turned away, by reason
//! - `login_admitted_total` (counter): tickets that reached the head
//! - `login_abandoned_total` (counter): tickets released before admission, by reason
//! - `login_queue_wait_seconds` (histogram): enqueue to admission
//! - `login_backend_dial_failures_total` (counter)
//! - `login_relay_bytes_total` (counter): bytes relayed, by direction
//! - `login_active_connections` (gauge): open client connections
//!
//! # Design Decisions
//! - The depth gauge is only refreshed at admission checks, not continuously
//! - Recording is a no-op until a recorder is installed

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Duration;

pub const LOGIN_ATTEMPTS_TOTAL: &str = "login_attempts_total";
pub const ACTIVE_QUEUE_SIZE: &str = "active_queue_size";
pub const LOGIN_REJECTED_TOTAL: &str = "login_rejected_total";
pub const LOGIN_ADMITTED_TOTAL: &str = "login_admitted_total";
pub const LOGIN_ABANDONED_TOTAL: &str = "login_abandoned_total";
pub const LOGIN_QUEUE_WAIT_SECONDS: &str = "login_queue_wait_seconds";
pub const BACKEND_DIAL_FAILURES_TOTAL: &str = "login_backend_dial_failures_total";
pub const RELAY_BYTES_TOTAL: &str = "login_relay_bytes_total";
pub const ACTIVE_CONNECTIONS: &str = "login_active_connections";

/// Install the Prometheus recorder and start its HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    describe_metrics();
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

fn describe_metrics() {
    describe_counter!(LOGIN_ATTEMPTS_TOTAL, "Total login connection attempts");
    describe_gauge!(ACTIVE_QUEUE_SIZE, "Current number of clients in queue");
    describe_counter!(LOGIN_REJECTED_TOTAL, "Connections turned away before queueing");
    describe_counter!(LOGIN_ADMITTED_TOTAL, "Connections admitted to the backend");
    describe_counter!(LOGIN_ABANDONED_TOTAL, "Tickets released before admission");
    describe_histogram!(LOGIN_QUEUE_WAIT_SECONDS, "Time from enqueue to admission");
    describe_counter!(BACKEND_DIAL_FAILURES_TOTAL, "Failed dials to the auth backend");
    describe_counter!(RELAY_BYTES_TOTAL, "Bytes relayed between clients and backend");
    describe_gauge!(ACTIVE_CONNECTIONS, "Open client connections");
}

pub fn record_login_attempt() {
    counter!(LOGIN_ATTEMPTS_TOTAL).increment(1);
}

pub fn set_queue_depth(depth: u64) {
    gauge!(ACTIVE_QUEUE_SIZE).set(depth as f64);
}

pub fn record_rejected(reason: &'static str) {
    counter!(LOGIN_REJECTED_TOTAL, "reason" => reason).increment(1);
}

pub fn record_admitted(waited: Duration) {
    counter!(LOGIN_ADMITTED_TOTAL).increment(1);
    histogram!(LOGIN_QUEUE_WAIT_SECONDS).record(waited.as_secs_f64());
}

pub fn record_abandoned(reason: &'static str) {
    counter!(LOGIN_ABANDONED_TOTAL, "reason" => reason).increment(1);
}

pub fn record_dial_failure() {
    counter!(BACKEND_DIAL_FAILURES_TOTAL).increment(1);
}

pub fn record_relayed(client_to_backend: u64, backend_to_client: u64) {
    counter!(RELAY_BYTES_TOTAL, "direction" => "client_to_backend").increment(client_to_backend);
    counter!(RELAY_BYTES_TOTAL, "direction" => "backend_to_client").increment(backend_to_client);
}

pub fn set_active_connections(count: u64) {
    gauge!(ACTIVE_CONNECTIONS).set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposes_attempts_and_queue_depth() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            record_login_attempt();
            record_login_attempt();
            record_login_attempt();
            set_queue_depth(7);
            set_queue_depth(4);
            record_rejected("capacity");
        });

        let rendered = handle.render();
        assert!(rendered.contains("login_attempts_total 3"), "{rendered}");
        assert!(rendered.contains("active_queue_size 4"), "{rendered}");
        assert!(
            rendered.contains("login_rejected_total{reason=\"capacity\"} 1"),
            "{rendered}"
        );
    }
}
