//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use auth_gate::config::BackendTarget;
use auth_gate::GateConfig;
use axum::body::{Body, Bytes};
use axum::extract::Request;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use http_body_util::BodyExt;
use tokio::net::TcpListener;

/// What an auth backend saw.
#[derive(Debug, Clone)]
pub struct Seen {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Requests received by a mock auth backend, in arrival order.
#[derive(Clone, Default)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl Recorder {
    pub fn all(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    pub fn last(&self) -> Seen {
        self.all().pop().expect("auth backend received no request")
    }

    pub fn count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

/// Serve `router` on an ephemeral port.
pub async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Start an auth backend that records every request and answers with `respond`.
pub async fn start_auth_backend<F>(respond: F) -> (SocketAddr, Recorder)
where
    F: Fn(&Seen) -> Response + Clone + Send + Sync + 'static,
{
    let recorder = Recorder::default();
    let seen = recorder.clone();
    let router = Router::new().fallback(move |request: Request| {
        let seen = seen.clone();
        let respond = respond.clone();
        async move {
            let (parts, body) = request.into_parts();
            let body = body.collect().await.unwrap().to_bytes();
            let request = Seen {
                method: parts.method,
                uri: parts.uri,
                headers: parts.headers,
                body,
            };
            let response = respond(&request);
            seen.seen.lock().unwrap().push(request);
            response
        }
    });
    (serve(router).await, recorder)
}

/// Start an auth backend that always answers `status` with an empty body.
pub async fn start_status_backend(status: StatusCode) -> (SocketAddr, Recorder) {
    start_auth_backend(move |_| status.into_response()).await
}

/// Start a TCP server that accepts connections and never answers.
pub async fn start_silent_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    addr
}

/// An address nothing listens on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

pub fn target(addr: SocketAddr) -> BackendTarget {
    format!("http://{addr}").parse().unwrap()
}

/// Minimal gate configuration pointing at `backend`.
pub fn gate_config(backend: SocketAddr) -> GateConfig {
    let mut config = GateConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.auth_request.backend = Some(format!("http://{backend}"));
    config.timeouts.request_secs = 2;
    config
}

/// Downstream router that counts calls and echoes what it got.
///
/// The response body is `identity=<x-auth-request values>;body=<request body>`.
pub fn counting_downstream() -> (Router, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let router = Router::new().fallback(move |request: Request| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            let identity = request
                .headers()
                .get_all("x-auth-request")
                .iter()
                .map(|value| value.to_str().unwrap_or_default().to_string())
                .collect::<Vec<_>>()
                .join(",");
            let body = request.into_body().collect().await.unwrap().to_bytes();
            format!("identity={identity};body={}", String::from_utf8_lossy(&body))
        }
    });
    (router, calls)
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}
