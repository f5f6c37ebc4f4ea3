//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route Compilation (at startup):
//!     RouteConfig[]
//!     → router.rs (Route, RouteTable)
//!     → one axum route pair per prefix, layered by auth mode and PHI audit
//!
//! Per request:
//!     axum match → Extension<Arc<Route>> → Route::rewrite → Dispatcher
//! ```

pub mod router;

pub use router::{Route, RouteTable};
