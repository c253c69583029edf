//! Error types for the auth subrequest path.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    BoxError,
};

/// Failure to obtain a response from a backend.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("backend request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    #[error("backend did not respond within {0:?}")]
    Timeout(Duration),

    #[error("request cancelled")]
    Cancelled,
}

/// Failure of the auth middleware itself. The request is never let through.
#[derive(Debug, thiserror::Error)]
pub enum AuthRequestError {
    #[error("failed to build auth subrequest: {0}")]
    Subrequest(#[from] axum::http::Error),

    #[error("auth backend unavailable: {0}")]
    Backend(#[from] TransportError),
}

impl AuthRequestError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthRequestError::Backend(TransportError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            AuthRequestError::Subrequest(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AuthRequestError::Backend(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for AuthRequestError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::warn!(error = %self, status = %status, "Auth request failed, denying");
        (status, "Authentication backend unavailable").into_response()
    }
}

/// Failure while streaming a denied response back to the client.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("reading backend body failed: {0}")]
    Backend(BoxError),

    #[error("relay cancelled")]
    Cancelled,
}
