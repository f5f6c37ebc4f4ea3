//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum router, middleware stack, proxy handler)
//!     → request.rs (request id, client ip, headers forwarded to backends)
//!     → Dispatcher
//!     → response.rs (backend response → client response)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{X_REQUEST_ID, X_SESSION_ID, X_USER_ID};
pub use server::{AppState, GatewayServer};
