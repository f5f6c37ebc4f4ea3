//! Backend dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Route matched → backend name identified
//!     → backend.rs (registry lookup: name → base URL + pooled client)
//!     → dispatcher.rs (breaker check, call, outcome recording)
//!     → BackendResponse or GatewayError
//! ```
//!
//! # Design Decisions
//! - Registry is built once at startup and is open to new backends via config only
//! - One pooled client per backend, bounded idle connections, fixed per-call timeout
//! - Breaker and health state are owned by the Dispatcher instance

pub mod backend;
pub mod dispatcher;

pub use backend::{Backend, BackendError, BackendRegistry, USER_AGENT};
pub use dispatcher::{BackendReport, BackendResponse, Dispatcher};
