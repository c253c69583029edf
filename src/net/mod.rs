//! Network layer: sockets in, connection metadata out.
//!
//! ```text
//! TcpListener accept (bounded by max_connections)
//!     → optional rustls handshake
//!     → ClientConnection { peer, secure, closed } attached to each request
//!     → hyper connection in http::server
//! ```

pub mod connection;
pub mod listener;
pub mod tls;

pub use connection::ClientConnection;
pub use listener::Listener;
