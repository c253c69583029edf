//! Downstream handlers for the bundled server.
//!
//! Allowed requests are forwarded to a single upstream, or answered with
//! `204 No Content` when none is configured. The request body has already
//! been consumed by the auth subrequest at this point.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use http_body::Body as _;
use tokio_util::sync::CancellationToken;

use crate::config::target::BackendTarget;
use crate::http::transport::Transport;
use crate::security::headers;

#[derive(Clone)]
struct UpstreamState {
    target: Arc<BackendTarget>,
    transport: Transport,
}

/// Router forwarding every request to `target`.
pub fn upstream_router(target: BackendTarget, transport: Transport) -> Router {
    tracing::info!(upstream = %target, "Forwarding allowed requests upstream");
    Router::new().fallback(forward).with_state(UpstreamState {
        target: Arc::new(target),
        transport,
    })
}

/// Router answering every request with `204 No Content`.
pub fn no_content_router() -> Router {
    Router::new().fallback(|| async { StatusCode::NO_CONTENT })
}

async fn forward(State(state): State<UpstreamState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    let uri = match state.target.uri_for(parts.uri.path_and_query()) {
        Ok(uri) => uri,
        Err(err) => {
            tracing::error!(error = %err, "Failed to build upstream URI");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut headers = headers::strip_hop_headers(&parts.headers).into_owned();
    if body.size_hint().exact() == Some(0) {
        headers.remove(header::CONTENT_LENGTH);
    }

    let mut upstream_request = match Request::builder()
        .method(parts.method.clone())
        .uri(uri)
        .body(body)
    {
        Ok(request) => request,
        Err(err) => {
            tracing::error!(error = %err, "Failed to build upstream request");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    *upstream_request.headers_mut() = headers;

    match state
        .transport
        .invoke(upstream_request, &CancellationToken::new())
        .await
    {
        Ok(response) => {
            let (mut parts, body) = response.into_parts();
            parts.headers = headers::strip_hop_headers(&parts.headers).into_owned();
            Response::from_parts(parts, Body::new(body))
        }
        Err(err) => {
            tracing::error!(
                method = %parts.method,
                path = %parts.uri.path(),
                upstream = %state.target,
                error = %err,
                "Upstream error"
            );
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::TimeoutConfig;
    use axum::routing::any;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn forwards_to_upstream_without_hop_headers() {
        let app = Router::new().route(
            "/{*path}",
            any(|request: Request| async move {
                let upgrade = request.headers().contains_key("upgrade");
                format!("{} {} upgrade={upgrade}", request.method(), request.uri())
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let router = upstream_router(
            format!("http://{addr}").parse().unwrap(),
            Transport::new(&TimeoutConfig::default()),
        );
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/docs/a?b=c")
                    .header("upgrade", "h2c")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"GET /docs/a?b=c upgrade=false");
    }

    #[tokio::test]
    async fn unreachable_upstream_is_bad_gateway() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let router = upstream_router(
            format!("http://{addr}").parse().unwrap(),
            Transport::new(&TimeoutConfig::default()),
        );
        let response = router
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn no_content_without_upstream() {
        let response = no_content_router()
            .oneshot(Request::builder().uri("/x").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}
