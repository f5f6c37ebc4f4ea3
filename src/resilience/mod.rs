//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to backend:
//!     → circuit_breaker.rs (fail fast if the backend is known-bad)
//!     → dispatcher performs the call under the per-call timeout
//!     → circuit_breaker.rs (record outcome, open circuit if threshold exceeded)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - A rejected call is never retried synchronously within the same request
//! - Circuit breaker prevents cascading failures

pub mod circuit_breaker;

pub use circuit_breaker::{BreakerRegistry, BreakerSnapshot, CircuitBreaker, CircuitState};
