//! Backend health records.
//!
//! # States
//! - Healthy: error count at most 2
//! - Degraded: error count 3..=5
//! - Unhealthy: error count above 5
//!
//! # Transitions
//! ```text
//! failure: error_count += 1
//! success: error_count -= 1 (floor 0), latency recorded
//! status re-derived from error_count after every update
//! ```
//!
//! # Design Decisions
//! - Each record sits behind its own lock; the map itself is fixed at startup
//! - Error count decays one step per success, so one good call does not hide a bad streak
//! - State changes logged for observability

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::observability::metrics;

/// Error counts above this are degraded.
pub const DEGRADED_THRESHOLD: u32 = 2;
/// Error counts above this are unhealthy.
pub const UNHEALTHY_THRESHOLD: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    fn from_error_count(errors: u32) -> Self {
        if errors > UNHEALTHY_THRESHOLD {
            HealthStatus::Unhealthy
        } else if errors > DEGRADED_THRESHOLD {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    fn gauge(self) -> f64 {
        match self {
            HealthStatus::Healthy => 1.0,
            HealthStatus::Degraded => 0.5,
            HealthStatus::Unhealthy => 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthRecord {
    pub status: HealthStatus,
    /// Latency of the last successful call, in milliseconds.
    pub last_response_time_ms: Option<u64>,
    pub error_count: u32,
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl Default for HealthRecord {
    fn default() -> Self {
        Self {
            status: HealthStatus::Healthy,
            last_response_time_ms: None,
            error_count: 0,
            last_checked_at: None,
        }
    }
}

/// Per-backend health, one lock per record.
#[derive(Debug)]
pub struct HealthTracker {
    records: HashMap<String, Mutex<HealthRecord>>,
}

impl HealthTracker {
    pub fn new<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let records = names
            .into_iter()
            .map(|name| (name.to_string(), Mutex::new(HealthRecord::default())))
            .collect();
        Self { records }
    }

    pub fn record_success(&self, backend: &str, latency: Duration) {
        self.update(backend, |record| {
            record.error_count = record.error_count.saturating_sub(1);
            record.last_response_time_ms = Some(latency.as_millis() as u64);
        });
    }

    pub fn record_failure(&self, backend: &str) {
        self.update(backend, |record| {
            record.error_count = record.error_count.saturating_add(1);
        });
    }

    fn update(&self, backend: &str, f: impl FnOnce(&mut HealthRecord)) {
        let Some(slot) = self.records.get(backend) else {
            tracing::debug!(backend, "Health update for unknown backend ignored");
            return;
        };
        let mut record = slot.lock();
        let previous = record.status;
        f(&mut record);
        record.status = HealthStatus::from_error_count(record.error_count);
        record.last_checked_at = Some(Utc::now());
        let status = record.status;
        drop(record);

        if status != previous {
            tracing::warn!(backend, from = ?previous, to = ?status, "Backend health changed");
        }
        metrics::record_backend_health(backend, status.gauge());
    }

    pub fn get(&self, backend: &str) -> Option<HealthRecord> {
        self.records.get(backend).map(|r| r.lock().clone())
    }

    /// Clone every record, holding each lock only for its own copy.
    pub fn snapshot(&self) -> HashMap<String, HealthRecord> {
        self.records
            .iter()
            .map(|(name, r)| (name.clone(), r.lock().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholds() {
        let tracker = HealthTracker::new(["chat"]);
        for _ in 0..3 {
            tracker.record_failure("chat");
        }
        assert_eq!(tracker.get("chat").unwrap().status, HealthStatus::Degraded);

        for _ in 0..3 {
            tracker.record_failure("chat");
        }
        let record = tracker.get("chat").unwrap();
        assert_eq!(record.status, HealthStatus::Unhealthy);
        assert_eq!(record.error_count, 6);
    }

    #[test]
    fn test_success_decays_errors() {
        let tracker = HealthTracker::new(["chat"]);
        for _ in 0..4 {
            tracker.record_failure("chat");
        }
        tracker.record_success("chat", Duration::from_millis(12));
        tracker.record_success("chat", Duration::from_millis(15));

        let record = tracker.get("chat").unwrap();
        assert_eq!(record.error_count, 2);
        assert_eq!(record.status, HealthStatus::Healthy);
        assert_eq!(record.last_response_time_ms, Some(15));
        assert!(record.last_checked_at.is_some());
    }

    #[test]
    fn test_success_floor_is_zero() {
        let tracker = HealthTracker::new(["chat"]);
        tracker.record_success("chat", Duration::from_millis(1));
        assert_eq!(tracker.get("chat").unwrap().error_count, 0);
    }

    #[test]
    fn test_unknown_backend_ignored() {
        let tracker = HealthTracker::new(["chat"]);
        tracker.record_failure("billing");
        assert!(tracker.get("billing").is_none());
        assert_eq!(tracker.snapshot().len(), 1);
    }
}
