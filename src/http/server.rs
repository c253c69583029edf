//! HTTP server setup and connection serving.
//!
//! # Responsibilities
//! - Build the Axum router: auth gate around the downstream, plus tracing
//! - Accept connections from the bounded listener, with optional TLS
//! - Serve HTTP/1.1 and HTTP/2 per connection via hyper-util
//! - Attach `ClientConnection` and `ConnectInfo` to every request
//! - Drain in-flight connections on shutdown

use std::net::SocketAddr;

use axum::{extract::ConnectInfo, Router};
use hyper::body::Incoming;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tower::Service;
use tower_http::trace::TraceLayer;

use crate::config::{ConfigError, GateConfig};
use crate::http::middleware::AuthRequest;
use crate::http::transport::Transport;
use crate::http::upstream::{no_content_router, upstream_router};
use crate::net::connection::{ClientConnection, ConnectionTracker};
use crate::net::listener::{Listener, ListenerError};
use crate::net::tls::{load_tls_config, TlsAcceptor};

/// HTTP server for the auth gate.
pub struct HttpServer {
    router: Router,
    config: GateConfig,
}

impl HttpServer {
    /// Create a server whose downstream comes from `[upstream]`.
    pub fn new(config: GateConfig) -> Result<Self, ConfigError> {
        let downstream = match config.upstream.target() {
            Some(target) => upstream_router(target?, Transport::new(&config.timeouts)),
            None => no_content_router(),
        };
        Self::with_downstream(config, downstream)
    }

    /// Create a server that gates an arbitrary downstream router.
    pub fn with_downstream(config: GateConfig, downstream: Router) -> Result<Self, ConfigError> {
        let gate = AuthRequest::from_config(&config)?;
        tracing::info!(backend = %gate.backend(), "Auth backend configured");

        let router = gate.wrap(downstream).layer(TraceLayer::new_for_http());
        Ok(Self { router, config })
    }

    /// Serve connections until `shutdown` fires, then drain.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let tls = match &self.config.listener.tls {
            Some(tls) => Some(TlsAcceptor::new(load_tls_config(tls).await?)),
            None => None,
        };

        tracing::info!(
            address = %listener.local_addr()?,
            tls = tls.is_some(),
            max_connections = listener.max_connections(),
            "HTTP server starting"
        );

        let tracker = ConnectionTracker::new();
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    tracing::info!(
                        in_flight = connections.len(),
                        active = tracker.active_count(),
                        "Stopping accept loop"
                    );
                    break;
                }

                accepted = listener.accept() => {
                    let (stream, remote_addr, permit) = match accepted {
                        Ok(accepted) => accepted,
                        Err(ListenerError::Closed) => break,
                        Err(err) => {
                            tracing::warn!(error = %err, "Accept failed");
                            continue;
                        }
                    };

                    if listener.available_permits() == 0 {
                        tracing::warn!(
                            max_connections = listener.max_connections(),
                            "Connection limit reached, further accepts wait for a free slot"
                        );
                    }

                    let router = self.router.clone();
                    let tracker = tracker.clone();
                    let shutdown = shutdown.resubscribe();
                    let tls = tls.clone();

                    connections.spawn(async move {
                        let _permit = permit;
                        match tls {
                            Some(tls) => match tls.handshake(stream).await {
                                Ok(stream) => {
                                    serve_connection(stream, remote_addr, true, router, tracker, shutdown).await
                                }
                                Err(err) => {
                                    tracing::debug!(peer_addr = %remote_addr, error = %err, "TLS handshake failed");
                                }
                            },
                            None => serve_connection(stream, remote_addr, false, router, tracker, shutdown).await,
                        }
                    });
                }

                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        while connections.join_next().await.is_some() {}

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GateConfig {
        &self.config
    }
}

async fn serve_connection<I>(
    io: I,
    remote_addr: SocketAddr,
    secure: bool,
    router: Router,
    tracker: ConnectionTracker,
    mut shutdown: broadcast::Receiver<()>,
) where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let guard = tracker.track(ClientConnection::new(remote_addr, secure));
    let connection = guard.connection().clone();
    let connection_id = connection.id();

    let service = hyper::service::service_fn(move |mut request: Request<Incoming>| {
        request.extensions_mut().insert(connection.clone());
        request.extensions_mut().insert(ConnectInfo(remote_addr));
        router.clone().call(request)
    });

    let builder = ConnBuilder::new(TokioExecutor::new());
    let conn = builder.serve_connection_with_upgrades(TokioIo::new(io), service);
    tokio::pin!(conn);

    let mut draining = false;
    loop {
        tokio::select! {
            result = conn.as_mut() => {
                if let Err(err) = result {
                    tracing::debug!(
                        connection_id = %connection_id,
                        peer_addr = %remote_addr,
                        error = %err,
                        "Connection error"
                    );
                }
                break;
            }
            _ = shutdown.recv(), if !draining => {
                draining = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    }

    drop(guard);
}
