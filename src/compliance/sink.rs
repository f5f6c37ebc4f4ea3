//! Durable audit sinks and the bounded worker pool that feeds them.
//!
//! ```text
//! AuditTrail::record → AuditQueue (bounded mpsc) → N workers → AuditSink
//! ```
//! A full queue never blocks a request: the entry is logged inline at warn
//! level instead and the failure is counted.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::compliance::audit::PhiAuditEntry;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("audit log io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize audit entry: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn write(&self, entry: &PhiAuditEntry) -> Result<(), SinkError>;
}

/// Emits each entry as a structured event on the `phi_audit` target.
pub struct TracingSink;

#[async_trait]
impl AuditSink for TracingSink {
    async fn write(&self, entry: &PhiAuditEntry) -> Result<(), SinkError> {
        tracing::info!(
            target: "phi_audit",
            audit_id = %entry.audit_id,
            user_id = entry.user_id.as_deref().unwrap_or("anonymous"),
            session_id = entry.session_id.as_deref().unwrap_or("-"),
            endpoint = %entry.endpoint,
            method = %entry.method,
            phi_types = ?entry.phi_types,
            risk_level = %entry.risk_level,
            access_approved = entry.access_approved,
            compliance_status = entry.compliance_status.as_str(),
            content_hash = %entry.content_hash,
            "PHI audit event"
        );
        Ok(())
    }
}

/// Appends entries as JSON lines.
pub struct FileSink {
    path: PathBuf,
    file: Mutex<tokio::fs::File>,
}

impl FileSink {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditSink for FileSink {
    async fn write(&self, entry: &PhiAuditEntry) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Producer side of the audit queue.
#[derive(Clone)]
pub struct AuditQueue {
    tx: mpsc::Sender<PhiAuditEntry>,
}

impl AuditQueue {
    pub fn channel(size: usize) -> (Self, mpsc::Receiver<PhiAuditEntry>) {
        let (tx, rx) = mpsc::channel(size.max(1));
        (Self { tx }, rx)
    }

    /// Hand an entry to the workers without waiting. Returns false when the
    /// queue is full or closed; the entry is then logged inline.
    pub fn submit(&self, entry: &PhiAuditEntry) -> bool {
        match self.tx.try_send(entry.clone()) {
            Ok(()) => true,
            Err(e) => {
                let reason = match e {
                    mpsc::error::TrySendError::Full(_) => "queue full",
                    mpsc::error::TrySendError::Closed(_) => "queue closed",
                };
                metrics::record_audit_sink_failure();
                tracing::warn!(
                    target: "phi_audit",
                    reason,
                    audit_id = %entry.audit_id,
                    endpoint = %entry.endpoint,
                    risk_level = %entry.risk_level,
                    access_approved = entry.access_approved,
                    compliance_status = entry.compliance_status.as_str(),
                    "Audit entry not queued, logged inline"
                );
                false
            }
        }
    }
}

/// Start `workers` tasks draining `rx` into `sink`. On shutdown they drain
/// whatever is still queued, then exit.
pub fn spawn_audit_workers(
    sink: Arc<dyn AuditSink>,
    rx: mpsc::Receiver<PhiAuditEntry>,
    workers: usize,
    shutdown: &Shutdown,
) -> Vec<JoinHandle<()>> {
    let rx = Arc::new(Mutex::new(rx));
    (0..workers.max(1))
        .map(|worker| {
            let rx = rx.clone();
            let sink = sink.clone();
            let mut stop = shutdown.subscribe();
            tokio::spawn(async move {
                loop {
                    let next = {
                        let mut rx = rx.lock().await;
                        tokio::select! {
                            biased;
                            entry = rx.recv() => entry,
                            _ = stop.recv() => None,
                        }
                    };
                    match next {
                        Some(entry) => persist(sink.as_ref(), &entry).await,
                        None => break,
                    }
                }

                loop {
                    let pending = rx.lock().await.try_recv();
                    match pending {
                        Ok(entry) => persist(sink.as_ref(), &entry).await,
                        Err(_) => break,
                    }
                }
                tracing::debug!(worker, "Audit worker stopped");
            })
        })
        .collect()
}

async fn persist(sink: &dyn AuditSink, entry: &PhiAuditEntry) {
    if let Err(e) = sink.write(entry).await {
        metrics::record_audit_sink_failure();
        tracing::error!(audit_id = %entry.audit_id, error = %e, "Failed to persist audit entry");
    }
}
