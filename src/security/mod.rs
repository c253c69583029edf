//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request:
//!     → headers.rs (strip hop-by-hop, add X-Forwarded-*)
//!     → auth subrequest
//! Backend deny response:
//!     → headers.rs (strip hop-by-hop and Connection-listed fields)
//!     → client
//! ```
//!
//! # Design Decisions
//! - Fail closed: no backend answer means no downstream call
//! - Header maps are only copied when something has to be removed

pub mod headers;
