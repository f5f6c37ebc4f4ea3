//! Health tracking subsystem.
//!
//! # Data Flow
//! ```text
//! Passive (every dispatched call):
//!     Dispatcher outcome
//!     → state.rs (error count up/down, latency, status)
//!
//! Active (active.rs):
//!     Periodic timer
//!     → Probe each backend's /health
//!     → state.rs
//!
//! Reporting:
//!     /health, /health/backends, /admin/backends
//!     → state.rs snapshot
//! ```
//!
//! # Design Decisions
//! - Active and passive checks are complementary
//! - Health state is per-backend, each record with its own lock
//! - Health is reported, not used to block calls; the circuit breaker does that

pub mod active;
pub mod state;

pub use active::HealthMonitor;
pub use state::{HealthRecord, HealthStatus, HealthTracker};
