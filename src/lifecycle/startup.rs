//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order (metrics, server, listener)
//! - Run the server until a shutdown signal arrives
//! - Drain connections before returning
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The listener binds last, so traffic only arrives once the gate is built

use std::net::SocketAddr;

use metrics_exporter_prometheus::BuildError;

use crate::config::{ConfigError, GateConfig};
use crate::http::HttpServer;
use crate::lifecycle::signals::shutdown_signal;
use crate::lifecycle::Shutdown;
use crate::net::listener::{Listener, ListenerError};
use crate::observability::metrics;

/// Error type for startup. Everything here ends the process.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("Failed to start metrics exporter: {0}")]
    Metrics(#[from] BuildError),

    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),
}

/// Run the gate with a validated configuration until SIGINT/SIGTERM.
pub async fn run(config: GateConfig) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = HttpServer::new(config)?;
    let listener = Listener::bind(&server.config().listener).await?;

    let shutdown = Shutdown::new();
    let serving = server.run(listener, shutdown.subscribe());
    tokio::pin!(serving);

    tokio::select! {
        result = &mut serving => return result.map_err(StartupError::from),
        () = shutdown_signal() => shutdown.trigger(),
    }

    serving.await?;
    tracing::info!("Shutdown complete");
    Ok(())
}
