//! PHI compliance subsystem.
//!
//! # Data Flow
//! ```text
//! Request body on a phi_audit route
//!     → detector.rs (categories, risk score, masking)
//!     → middleware.rs (access gate, response headers)
//!     → audit.rs (ring buffer of recent entries)
//!     → sink.rs (bounded queue → workers → tracing / JSON lines file)
//! ```

pub mod audit;
pub mod detector;
pub mod middleware;
pub mod sink;

pub use audit::{AuditStats, AuditTrail, ComplianceStatus, PhiAuditEntry};
pub use detector::{Detection, PhiCategory, PhiDetector, RiskLevel};
pub use middleware::{phi_audit_middleware, PhiAuditor, RequestMeta};
pub use sink::{spawn_audit_workers, AuditQueue, AuditSink, FileSink, SinkError, TracingSink};
