//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → auth.rs (optional identity from a bearer token)
//!     → session.rs (bind or mint a session)
//!     → rate_limit.rs (per-user or per-IP windows)
//!     → auth.rs (require_auth on protected routes)
//!     → Pass to compliance / dispatch
//! Every response:
//!     → headers.rs (security response headers)
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any failed mandatory check
//! - No trust in client identity headers

pub mod auth;
pub mod headers;
pub mod rate_limit;
pub mod session;
