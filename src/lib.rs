//! Healthcare API gateway library.
//!
//! Admission control (identity, sessions, rate limits, PHI auditing) in front
//! of breaker-guarded dispatch to named backend services.

// Core subsystems
pub mod config;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod routing;
pub mod store;

// Policy
pub mod compliance;
pub mod security;

// Backend state
pub mod health;
pub mod resilience;

// Cross-cutting concerns
pub mod admin;
pub mod lifecycle;
pub mod observability;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use http::server::{build_router, AppState, GatewayServer};
pub use lifecycle::Shutdown;
