//! Per-request cancellation scope.
//!
//! A [`CancelScope`] lives exactly as long as the work done for one inbound
//! request. When the client connection goes away, or the scope is dropped
//! on any exit path, its token fires. The auth subrequest holds a child
//! token, so both the backend exchange and the relayed body observe it.

use tokio_util::sync::{CancellationToken, DropGuard};

use crate::net::connection::ClientConnection;

/// Cancellation source for one inbound request. Cancels when dropped.
#[derive(Debug)]
pub struct CancelScope {
    token: CancellationToken,
    _guard: DropGuard,
}

impl CancelScope {
    /// Arm a scope, linking it to the client connection when one is known.
    ///
    /// With a connection, one observer task is spawned. It waits for either
    /// the connection's closed notification (then cancels the scope) or the
    /// scope's own cancellation, so it never outlives the scope.
    pub fn arm(connection: Option<&ClientConnection>) -> Self {
        let token = CancellationToken::new();

        if let Some(connection) = connection {
            let connection = connection.clone();
            let scope = token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = connection.closed() => {
                        tracing::debug!(
                            connection_id = %connection.id(),
                            "Client connection closed, cancelling auth request"
                        );
                        scope.cancel();
                    }
                    _ = scope.cancelled() => {}
                }
            });
        }

        let guard = token.clone().drop_guard();
        Self { token, _guard: guard }
    }

    /// Token for work that must stop when this scope ends.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn connection() -> ClientConnection {
        ClientConnection::new("192.0.2.10:51000".parse().unwrap(), false)
    }

    #[tokio::test]
    async fn drop_cancels_scope_and_children() {
        let scope = CancelScope::arm(None);
        let token = scope.token().clone();
        let child = scope.child_token();
        assert!(!token.is_cancelled());

        drop(scope);
        assert!(token.is_cancelled());
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn connection_close_cancels_scope() {
        let connection = connection();
        let scope = CancelScope::arm(Some(&connection));
        let child = scope.child_token();

        connection.mark_closed();
        tokio::time::timeout(Duration::from_secs(1), child.cancelled())
            .await
            .expect("scope not cancelled after connection close");
        assert!(scope.token().is_cancelled());
    }

    #[tokio::test]
    async fn scope_end_does_not_close_connection() {
        let connection = connection();
        let scope = CancelScope::arm(Some(&connection));
        drop(scope);

        tokio::task::yield_now().await;
        assert!(!connection.is_closed());
    }

    #[tokio::test]
    async fn already_closed_connection_cancels_immediately() {
        let connection = connection();
        connection.mark_closed();
        let scope = CancelScope::arm(Some(&connection));

        tokio::time::timeout(Duration::from_secs(1), scope.token().cancelled())
            .await
            .expect("scope not cancelled for closed connection");
    }
}
