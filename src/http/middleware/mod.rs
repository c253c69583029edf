//! HTTP middleware.

pub mod auth_request;

pub use auth_request::{auth_request, AuthRequest};
