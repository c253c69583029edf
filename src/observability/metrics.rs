//! Metrics collection and exposition.
//!
//! # Metrics
//! - `auth_gate_decisions_total` (counter): verdicts by outcome
//! - `auth_gate_subrequest_duration_seconds` (histogram): time to verdict
//! - `auth_gate_active_connections` (gauge): current client connections
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const OUTCOME_ALLOW: &str = "allow";
pub const OUTCOME_DENY: &str = "deny";
pub const OUTCOME_ERROR: &str = "error";

/// Install the Prometheus exporter listening on `addr`.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    metrics::describe_counter!(
        "auth_gate_decisions_total",
        "Auth verdicts by outcome (allow, deny, error)"
    );
    metrics::describe_histogram!(
        "auth_gate_subrequest_duration_seconds",
        metrics::Unit::Seconds,
        "Time from subrequest start to verdict"
    );
    metrics::describe_gauge!(
        "auth_gate_active_connections",
        "Client connections currently open"
    );

    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Record one auth verdict and how long the backend took to give it.
pub fn record_decision(outcome: &'static str, started: Instant) {
    metrics::counter!("auth_gate_decisions_total", "outcome" => outcome).increment(1);
    metrics::histogram!("auth_gate_subrequest_duration_seconds", "outcome" => outcome)
        .record(started.elapsed().as_secs_f64());
}

pub fn record_active_connections(active: u64) {
    metrics::gauge!("auth_gate_active_connections").set(active as f64);
}
