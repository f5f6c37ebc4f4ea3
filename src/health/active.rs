//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe each backend's health path
//! - Feed results into the shared HealthTracker
//!
//! Probes run on their own task and never hold a record lock across I/O;
//! the tracker lock is taken only after the probe has completed.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::time;

use crate::config::HealthCheckConfig;
use crate::dispatch::{Backend, BackendRegistry};
use crate::health::state::HealthTracker;

pub struct HealthMonitor {
    backends: Arc<BackendRegistry>,
    tracker: Arc<HealthTracker>,
    config: HealthCheckConfig,
}

impl HealthMonitor {
    pub fn new(backends: Arc<BackendRegistry>, tracker: Arc<HealthTracker>, config: HealthCheckConfig) -> Self {
        Self {
            backends,
            tracker,
            config,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Active health checks disabled");
            return;
        }

        tracing::info!(
            interval = self.config.interval_secs,
            path = %self.config.path,
            "Health monitor starting"
        );

        let mut ticker = time::interval(Duration::from_secs(self.config.interval_secs.max(1)));
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe every backend concurrently and record the outcomes.
    pub async fn check_all(&self) {
        let probes = self.backends.all().into_iter().map(|backend| {
            let path = self.config.path.clone();
            let timeout = Duration::from_secs(self.config.timeout_secs);
            tokio::spawn(async move {
                let result = probe(&backend, &path, timeout).await;
                (backend.name.clone(), result)
            })
        });

        for handle in probes.collect::<Vec<_>>() {
            match handle.await {
                Ok((name, Some(latency))) => self.tracker.record_success(&name, latency),
                Ok((name, None)) => self.tracker.record_failure(&name),
                Err(e) => tracing::error!(error = %e, "Health probe task panicked"),
            }
        }
    }
}

/// Returns the probe latency when the backend answered 2xx.
async fn probe(backend: &Backend, path: &str, timeout: Duration) -> Option<Duration> {
    let started = Instant::now();
    let request = backend.client.get(backend.url_for(path)).timeout(timeout).send();

    match request.await {
        Ok(response) if response.status().is_success() => Some(started.elapsed()),
        Ok(response) => {
            tracing::warn!(backend = %backend.name, status = %response.status(), "Health check failed: non-success status");
            None
        }
        Err(e) if e.is_timeout() => {
            tracing::warn!(backend = %backend.name, "Health check failed: timeout");
            None
        }
        Err(e) => {
            tracing::warn!(backend = %backend.name, error = %e, "Health check failed: connection error");
            None
        }
    }
}
