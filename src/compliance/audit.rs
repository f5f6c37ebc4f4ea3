//! Bounded in-memory audit trail.
//!
//! Every entry is handed to the durable sink queue before it enters the ring
//! buffer, so eviction only trims retained detail.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::compliance::detector::{PhiCategory, RiskLevel};
use crate::compliance::sink::AuditQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    Compliant,
    Monitored,
    Violation,
}

impl ComplianceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ComplianceStatus::Compliant => "compliant",
            ComplianceStatus::Monitored => "monitored",
            ComplianceStatus::Violation => "violation",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PhiAuditEntry {
    pub audit_id: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub endpoint: String,
    pub method: String,
    pub client_ip: String,
    pub phi_detected: bool,
    pub phi_types: Vec<PhiCategory>,
    pub risk_level: RiskLevel,
    pub risk_score: f64,
    /// Masked and truncated; never raw content.
    pub masked_preview: String,
    /// SHA-256 of the raw content, hex encoded.
    pub content_hash: String,
    pub access_approved: bool,
    pub compliance_status: ComplianceStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditStats {
    pub capacity: usize,
    pub retained: usize,
    pub total_recorded: u64,
    pub evicted: u64,
    /// Entries the sink queue refused; these only reached the inline log.
    pub unqueued: u64,
    pub phi_detected: usize,
    pub access_denied: usize,
    pub by_risk_level: BTreeMap<&'static str, usize>,
}

pub struct AuditTrail {
    entries: Mutex<VecDeque<PhiAuditEntry>>,
    capacity: usize,
    queue: AuditQueue,
    recorded: AtomicU64,
    evicted: AtomicU64,
    unqueued: AtomicU64,
}

impl AuditTrail {
    pub fn new(capacity: usize, queue: AuditQueue) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            queue,
            recorded: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
            unqueued: AtomicU64::new(0),
        }
    }

    pub fn record(&self, entry: PhiAuditEntry) {
        if !self.queue.submit(&entry) {
            self.unqueued.fetch_add(1, Ordering::Relaxed);
        }
        self.recorded.fetch_add(1, Ordering::Relaxed);

        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            if let Some(oldest) = entries.pop_front() {
                self.evicted.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(audit_id = %oldest.audit_id, "Evicted audit entry from ring buffer");
            }
        }
        entries.push_back(entry);
    }

    /// Up to `limit` entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<PhiAuditEntry> {
        self.entries.lock().iter().rev().take(limit).cloned().collect()
    }

    pub fn get(&self, audit_id: &str) -> Option<PhiAuditEntry> {
        self.entries
            .lock()
            .iter()
            .rev()
            .find(|e| e.audit_id == audit_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn stats(&self) -> AuditStats {
        let entries = self.entries.lock();
        let mut stats = AuditStats {
            capacity: self.capacity,
            retained: entries.len(),
            total_recorded: self.recorded.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            unqueued: self.unqueued.load(Ordering::Relaxed),
            ..AuditStats::default()
        };
        for entry in entries.iter() {
            stats.phi_detected += usize::from(entry.phi_detected);
            stats.access_denied += usize::from(!entry.access_approved);
            *stats.by_risk_level.entry(entry.risk_level.as_str()).or_default() += 1;
        }
        stats
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn entry(id: &str, approved: bool) -> PhiAuditEntry {
        PhiAuditEntry {
            audit_id: id.to_string(),
            timestamp: Utc::now(),
            user_id: None,
            session_id: None,
            endpoint: "/chat".into(),
            method: "POST".into(),
            client_ip: "127.0.0.1".into(),
            phi_detected: !approved,
            phi_types: vec![],
            risk_level: if approved { RiskLevel::Minimal } else { RiskLevel::High },
            risk_score: if approved { 0.0 } else { 0.5 },
            masked_preview: String::new(),
            content_hash: String::new(),
            access_approved: approved,
            compliance_status: if approved {
                ComplianceStatus::Compliant
            } else {
                ComplianceStatus::Violation
            },
        }
    }

    #[tokio::test]
    async fn test_ring_buffer_evicts_oldest_after_sink() {
        let (queue, mut rx) = AuditQueue::channel(16);
        let trail = AuditTrail::new(3, queue);

        for i in 0..5 {
            trail.record(entry(&format!("a{i}"), true));
        }

        let ids: Vec<_> = trail.recent(10).into_iter().map(|e| e.audit_id).collect();
        assert_eq!(ids, vec!["a4", "a3", "a2"]);

        // The sink saw every entry, including the evicted ones.
        for i in 0..5 {
            assert_eq!(rx.recv().await.unwrap().audit_id, format!("a{i}"));
        }

        let stats = trail.stats();
        assert_eq!(stats.total_recorded, 5);
        assert_eq!(stats.evicted, 2);
        assert_eq!(stats.retained, 3);
        assert_eq!(stats.unqueued, 0);
    }

    #[tokio::test]
    async fn test_refused_entries_still_retained() {
        let (queue, _rx) = AuditQueue::channel(1);
        let trail = AuditTrail::new(10, queue);
        trail.record(entry("queued", true));
        trail.record(entry("overflow", false));

        let stats = trail.stats();
        assert_eq!(stats.unqueued, 1);
        assert_eq!(stats.retained, 2);
        assert!(trail.get("overflow").is_some());
    }

    #[tokio::test]
    async fn test_stats_count_denials() {
        let (queue, _rx) = AuditQueue::channel(16);
        let trail = AuditTrail::new(10, queue);
        trail.record(entry("ok", true));
        trail.record(entry("denied", false));

        let stats = trail.stats();
        assert_eq!(stats.access_denied, 1);
        assert_eq!(stats.phi_detected, 1);
        assert_eq!(stats.by_risk_level.get("high"), Some(&1));
        assert!(trail.get("denied").is_some_and(|e| !e.access_approved));
    }
}
