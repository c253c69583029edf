//! Auth subrequest construction.
//!
//! # Responsibilities
//! - Re-target the inbound request at the auth backend
//! - Strip hop-by-hop headers, add X-Forwarded-For / X-Forwarded-Proto
//! - Forward the inbound body only when one was declared
//!
//! # Design Decisions
//! - The inbound request keeps its headers for the downstream handler; the
//!   subrequest gets at most one copy of them
//! - A missing peer address is not an error, X-Forwarded-For is left alone

use std::net::{IpAddr, SocketAddr};

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::uri::Scheme;
use axum::http::{header, Request};
use http_body::Body as _;
use tokio_util::sync::CancellationToken;

use crate::config::target::BackendTarget;
use crate::http::error::AuthRequestError;
use crate::net::connection::ClientConnection;
use crate::security::headers;

/// A request bound for the auth backend, with its cancellation source.
#[derive(Debug)]
pub struct Subrequest {
    pub request: Request<Body>,
    pub cancel: CancellationToken,
}

/// Derive the auth subrequest from `inbound`.
///
/// A non-empty inbound body is moved into the subrequest; `inbound` is left
/// with an empty body. Everything else on `inbound` is unchanged.
pub fn build_subrequest(
    inbound: &mut Request<Body>,
    backend: &BackendTarget,
    cancel: CancellationToken,
) -> Result<Subrequest, AuthRequestError> {
    let uri = backend.uri_for(inbound.uri().path_and_query())?;

    let body = if declares_empty_body(inbound) {
        Body::empty()
    } else {
        std::mem::take(inbound.body_mut())
    };

    let mut headers = headers::strip_hop_headers(inbound.headers()).into_owned();
    if let Some(ip) = client_ip(inbound) {
        headers::append_forwarded_for(&mut headers, ip);
    }
    headers::set_forwarded_proto(&mut headers, is_secure(inbound));

    let mut request = Request::builder()
        .method(inbound.method().clone())
        .uri(uri)
        .body(body)?;
    *request.headers_mut() = headers;

    Ok(Subrequest { request, cancel })
}

fn declares_empty_body(request: &Request<Body>) -> bool {
    if request.body().size_hint().exact() == Some(0) {
        return true;
    }
    request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        == Some(0)
}

fn client_ip<B>(request: &Request<B>) -> Option<IpAddr> {
    let extensions = request.extensions();
    extensions
        .get::<ClientConnection>()
        .map(ClientConnection::remote_addr)
        .or_else(|| {
            extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| *addr)
        })
        .map(|addr| addr.ip())
}

fn is_secure<B>(request: &Request<B>) -> bool {
    match request.extensions().get::<ClientConnection>() {
        Some(connection) => connection.secure(),
        None => request.uri().scheme() == Some(&Scheme::HTTPS),
    }
}
