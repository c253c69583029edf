//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted connection
//!     → server.rs (hyper-util connection, ClientConnection extension)
//!     → middleware/auth_request.rs
//!         → subrequest.rs (derive the auth subrequest)
//!         → transport.rs (send it, bounded by timeout and cancellation)
//!         → decision.rs (200/202 allow, anything else deny)
//!     → allow: downstream handler (upstream.rs in the bundled binary)
//!     → deny:  relay.rs (backend response streamed to the client)
//! ```

pub mod cancel;
pub mod decision;
pub mod error;
pub mod middleware;
pub mod relay;
pub mod server;
pub mod subrequest;
pub mod transport;
pub mod upstream;

pub use decision::{Decision, X_AUTH_REQUEST};
pub use error::AuthRequestError;
pub use middleware::{auth_request, AuthRequest};
pub use server::HttpServer;
pub use transport::Transport;
