//! Auth subrequest middleware.
//! Every request is authorised by the auth backend before it reaches the
//! wrapped router.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Request, State},
    http::Method,
    middleware::{self, Next},
    response::Response,
    Router,
};

use crate::config::schema::GateConfig;
use crate::config::target::BackendTarget;
use crate::config::{ConfigError, ValidationError};
use crate::http::cancel::CancelScope;
use crate::http::decision::{decide, inject_identity, Decision};
use crate::http::error::{AuthRequestError, TransportError};
use crate::http::relay::relay;
use crate::http::subrequest::build_subrequest;
use crate::http::transport::Transport;
use crate::net::connection::ClientConnection;
use crate::observability::metrics;

/// Middleware state: where to ask, and the shared client to ask with.
#[derive(Clone, Debug)]
pub struct AuthRequest {
    backend: Arc<BackendTarget>,
    transport: Transport,
}

impl AuthRequest {
    pub fn new(backend: BackendTarget, transport: Transport) -> Self {
        Self {
            backend: Arc::new(backend),
            transport,
        }
    }

    /// Build from a validated configuration.
    pub fn from_config(config: &GateConfig) -> Result<Self, ConfigError> {
        let backend = match config.auth_request.target() {
            Some(target) => target?,
            None => return Err(ConfigError::Validation(vec![ValidationError::MissingBackend])),
        };
        Ok(Self::new(backend, Transport::new(&config.timeouts)))
    }

    pub fn backend(&self) -> &BackendTarget {
        &self.backend
    }

    /// Put `next` behind the auth backend.
    pub fn wrap<S>(self, next: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        next.layer(middleware::from_fn_with_state(self, auth_request))
    }
}

/// Ask the backend, then either run `next` or relay the backend's answer.
///
/// Errors never let the request through; they become a 502/504.
pub async fn auth_request(
    State(auth): State<AuthRequest>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthRequestError> {
    let connection = request.extensions().get::<ClientConnection>().cloned();
    let scope = CancelScope::arm(connection.as_ref());

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let subrequest = match build_subrequest(&mut request, &auth.backend, scope.child_token()) {
        Ok(subrequest) => subrequest,
        Err(err) => return Err(reject(&auth, &method, &path, started, err)),
    };
    let response = match auth
        .transport
        .invoke(subrequest.request, &subrequest.cancel)
        .await
    {
        Ok(response) => response,
        Err(err) => return Err(reject(&auth, &method, &path, started, err.into())),
    };

    let status = response.status();
    match decide(response) {
        Decision::Allow { identity } => {
            metrics::record_decision(metrics::OUTCOME_ALLOW, started);
            tracing::debug!(
                method = %method,
                path = %path,
                status = %status,
                identity = identity.is_some(),
                "Auth backend allowed request"
            );
            inject_identity(&mut request, identity);
            let response = next.run(request).await;
            drop(scope);
            Ok(response)
        }
        Decision::Deny(response) => {
            metrics::record_decision(metrics::OUTCOME_DENY, started);
            tracing::debug!(
                method = %method,
                path = %path,
                status = %status,
                "Auth backend denied request, relaying its response"
            );
            Ok(relay(response, scope))
        }
    }
}

/// Count and log a failed auth exchange. The request is denied either way.
fn reject(
    auth: &AuthRequest,
    method: &Method,
    path: &str,
    started: Instant,
    err: AuthRequestError,
) -> AuthRequestError {
    metrics::record_decision(metrics::OUTCOME_ERROR, started);
    tracing::warn!(
        method = %method,
        path = %path,
        backend = %auth.backend,
        error = %err,
        "Auth backend request failed"
    );
    err
}
