//! Shared HTTP client for backend exchanges.
//!
//! # Responsibilities
//! - Own the connection pool shared by every request
//! - Bound each exchange by the configured request timeout
//! - Abort promptly when the caller's cancellation token fires
//! - Speak TLS to `https` backends (webpki roots), plain TCP to `http` ones
//!
//! # Design Decisions
//! - No retries: a failed exchange is reported as is
//! - Timeout covers the time until response headers arrive; the body is
//!   streamed by the caller afterwards

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use hyper::body::Incoming;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::{TokioExecutor, TokioTimer},
};
use tokio_util::sync::CancellationToken;

use crate::config::schema::TimeoutConfig;
use crate::http::error::TransportError;

/// Pooled client safe for concurrent use. Clones share the pool.
#[derive(Clone, Debug)]
pub struct Transport {
    client: Client<HttpsConnector<HttpConnector>, Body>,
    timeout: Duration,
}

impl Transport {
    pub fn new(config: &TimeoutConfig) -> Self {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_connect_timeout(Some(Duration::from_secs(config.connect_secs)));
        http.set_nodelay(true);

        let connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .wrap_connector(http);

        let client = Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .pool_idle_timeout(Duration::from_secs(config.idle_secs))
            .build(connector);

        Self {
            client,
            timeout: Duration::from_secs(config.request_secs),
        }
    }

    /// Send `request` and wait for the response head.
    ///
    /// Returns [`TransportError::Cancelled`] as soon as `cancel` fires, also
    /// when it already fired before the call.
    pub async fn invoke(
        &self,
        request: Request<Body>,
        cancel: &CancellationToken,
    ) -> Result<Response<Incoming>, TransportError> {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => Err(TransportError::Cancelled),

            result = tokio::time::timeout(self.timeout, self.client.request(request)) => {
                match result {
                    Ok(response) => response.map_err(TransportError::Request),
                    Err(_) => Err(TransportError::Timeout(self.timeout)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Router};
    use std::net::SocketAddr;

    fn config(request_secs: u64) -> TimeoutConfig {
        TimeoutConfig {
            connect_secs: 1,
            request_secs,
            idle_secs: 5,
        }
    }

    async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn get_request(addr: SocketAddr) -> Request<Body> {
        Request::builder()
            .uri(format!("http://{addr}/"))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn returns_backend_response() {
        let addr = serve(Router::new().route("/", get(|| async { "ok" }))).await;
        let transport = Transport::new(&config(5));

        let response = transport
            .invoke(get_request(addr), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn pre_cancelled_token_short_circuits() {
        let addr = serve(Router::new().route("/", get(|| async { "ok" }))).await;
        let transport = Transport::new(&config(5));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = transport.invoke(get_request(addr), &cancel).await.unwrap_err();
        assert!(matches!(err, TransportError::Cancelled));
    }

    #[tokio::test]
    async fn cancellation_unblocks_in_flight_exchange() {
        let app = Router::new().route(
            "/",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                "late"
            }),
        );
        let addr = serve(app).await;
        let transport = Transport::new(&config(60));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            transport.invoke(get_request(addr), &cancel),
        )
        .await
        .expect("invoke hung after cancellation")
        .unwrap_err();
        assert!(matches!(err, TransportError::Cancelled));
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let app = Router::new().route(
            "/",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                "late"
            }),
        );
        let addr = serve(app).await;
        let transport = Transport::new(&config(1));

        let err = transport
            .invoke(get_request(addr), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout(d) if d == Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn https_backend_gets_a_tls_handshake() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (first_byte, received) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            use tokio::io::AsyncReadExt;
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut byte = [0u8; 1];
            socket.read_exact(&mut byte).await.unwrap();
            let _ = first_byte.send(byte[0]);
        });

        let transport = Transport::new(&config(5));
        let request = Request::builder()
            .uri(format!("https://{addr}/"))
            .body(Body::empty())
            .unwrap();
        let err = transport
            .invoke(request, &CancellationToken::new())
            .await
            .unwrap_err();

        // 0x16 is the TLS handshake record type of a ClientHello.
        assert_eq!(received.await.unwrap(), 0x16);
        assert!(matches!(err, TransportError::Request(_)));
    }

    #[tokio::test]
    async fn unreachable_backend_is_an_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = Transport::new(&config(5));
        let err = transport
            .invoke(get_request(addr), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Request(_)));
    }
}
