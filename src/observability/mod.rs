//! Logs and metrics.
//!
//! Logging goes through `tracing`; `init_logging` picks the pretty or JSON
//! formatter. Metrics are recorded through the `metrics` facade and only
//! exported once `init_metrics` has installed the Prometheus recorder.

pub mod logging;
pub mod metrics;
