//! Auth-request gate.
//!
//! Every inbound request is first replayed as a subrequest against an auth
//! backend. A `200` or `202` lets the request through to the downstream
//! handler; any other answer is sent back to the client as-is.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod security;

pub use config::schema::GateConfig;
pub use http::{AuthRequest, HttpServer};
pub use lifecycle::Shutdown;
