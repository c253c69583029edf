//! Connection metadata and lifecycle tracking.
//!
//! # Responsibilities
//! - Describe the client connection to request handlers (peer, TLS, liveness)
//! - Generate unique connection IDs for tracing
//! - Count active connections for metrics and shutdown logs

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::observability::metrics;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// The client side of an inbound request.
///
/// The server inserts one of these into every request's extensions. Clones
/// share the same closed notification.
#[derive(Debug, Clone)]
pub struct ClientConnection {
    id: ConnectionId,
    remote_addr: SocketAddr,
    secure: bool,
    closed: CancellationToken,
}

impl ClientConnection {
    pub fn new(remote_addr: SocketAddr, secure: bool) -> Self {
        Self {
            id: ConnectionId::new(),
            remote_addr,
            secure,
            closed: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Whether the connection was accepted over TLS.
    pub fn secure(&self) -> bool {
        self.secure
    }

    /// Resolves once the connection has gone away.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closed.cancelled()
    }

    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Signal that the connection is gone. Idempotent.
    pub fn mark_closed(&self) {
        self.closed.cancel();
    }
}

/// Tracks active connections.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    /// Current count of active connections.
    active_count: Arc<AtomicU64>,
}

impl ConnectionTracker {
    /// Create a new connection tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new active connection. Returns a guard that decrements and
    /// marks the connection closed on drop.
    pub fn track(&self, connection: ClientConnection) -> ConnectionGuard {
        let active = self.active_count.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::record_active_connections(active);
        ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            connection,
        }
    }

    /// Get current active connection count.
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }
}

/// Guard that tracks a connection's lifetime.
#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
    connection: ClientConnection,
}

impl ConnectionGuard {
    pub fn connection(&self) -> &ClientConnection {
        &self.connection
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.connection.mark_closed();
        let active = self.active_count.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::record_active_connections(active);
        tracing::trace!(connection_id = %self.connection.id(), "Connection closed");
    }
}
