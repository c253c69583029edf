//! Stand-in auth backend for trying the gate by hand.
//!
//! `Authorization: Bearer <name>` is accepted and echoed back as the
//! identity; anything else is redirected to a login page.
//!
//! ```text
//! cargo run --example mock_auth_backend
//! cargo run -- --backend http://127.0.0.1:2015
//! curl -i -H 'Authorization: Bearer alice' http://127.0.0.1:8080/
//! ```

use axum::{
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use std::net::SocketAddr;

async fn check(method: Method, uri: Uri, headers: HeaderMap) -> Response {
    let name = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .filter(|name| !name.is_empty());

    println!(
        "{method} {uri} from {}",
        headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .unwrap_or("-")
    );

    match name {
        Some(name) => (StatusCode::OK, [("x-auth-request", name.to_string())]).into_response(),
        None => (
            StatusCode::SEE_OTHER,
            [(header::LOCATION, "https://login.example/")],
            "Login required\n",
        )
            .into_response(),
    }
}

#[tokio::main]
async fn main() {
    let app = Router::new().fallback(check);

    let addr = SocketAddr::from(([127, 0, 0, 1], 2015));
    println!("Mock auth backend is listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
