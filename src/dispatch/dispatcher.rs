//! Breaker-gated calls to named backends.
//!
//! # Call sequence
//! ```text
//! resolve backend ──unknown──▶ UnknownBackend
//!     → breaker.can_execute() ──false──▶ CircuitOpen (no I/O, no health update)
//!     → HTTP call (default headers + caller headers, per-call timeout)
//!     → transport error / 5xx: breaker.on_failure(), health failure
//!     → < 500: breaker.on_success(), health success with latency
//! ```
//!
//! The outbound future lives inside the inbound request future. When the
//! client disconnects or the request timeout fires, the inbound future is
//! dropped and the outbound call is aborted with it.

use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use bytes::Bytes;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::config::GatewayConfig;
use crate::dispatch::backend::{BackendError, BackendRegistry};
use crate::error::GatewayError;
use crate::health::state::{HealthRecord, HealthTracker};
use crate::observability::metrics;
use crate::resilience::{BreakerRegistry, BreakerSnapshot};

/// Response read back from a backend.
#[derive(Debug)]
pub struct BackendResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Owns backends, their breakers and their health; no process-wide state.
#[derive(Debug)]
pub struct Dispatcher {
    backends: Arc<BackendRegistry>,
    breakers: BreakerRegistry,
    health: Arc<HealthTracker>,
}

impl Dispatcher {
    pub fn new(backends: Arc<BackendRegistry>, breakers: BreakerRegistry, health: Arc<HealthTracker>) -> Self {
        Self {
            backends,
            breakers,
            health,
        }
    }

    /// Build backends, breakers and health records for every configured backend.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, BackendError> {
        let backends = Arc::new(BackendRegistry::from_config(&config.backends, &config.timeouts)?);
        let breakers = BreakerRegistry::new(backends.names(), &config.circuit_breaker);
        let health = Arc::new(HealthTracker::new(backends.names()));
        Ok(Self::new(backends, breakers, health))
    }

    pub fn backends(&self) -> &Arc<BackendRegistry> {
        &self.backends
    }

    pub fn health(&self) -> &Arc<HealthTracker> {
        &self.health
    }

    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }

    /// Call `backend` at `path_and_query`.
    ///
    /// Any HTTP response is returned as `Ok`, including 5xx, so callers can
    /// surface the backend's status; only transport failures are errors.
    pub async fn call(
        &self,
        backend_name: &str,
        method: Method,
        path_and_query: &str,
        body: Option<Bytes>,
        headers: HeaderMap,
    ) -> Result<BackendResponse, GatewayError> {
        let backend = self
            .backends
            .get(backend_name)
            .ok_or_else(|| GatewayError::UnknownBackend(backend_name.to_string()))?;
        let breaker = self
            .breakers
            .get(backend_name)
            .ok_or_else(|| GatewayError::UnknownBackend(backend_name.to_string()))?;

        if !breaker.can_execute() {
            tracing::warn!(backend = backend_name, "Circuit open, failing fast");
            metrics::record_circuit_rejection(backend_name);
            return Err(GatewayError::CircuitOpen(backend_name.to_string()));
        }

        let url = backend.url_for(path_and_query);
        let mut request = backend
            .client
            .request(method.clone(), &url)
            .headers(merge_headers(headers));
        if let Some(body) = body {
            request = request.body(body);
        }

        let started = Instant::now();
        let outcome = request.send().await;
        let result = match outcome {
            Ok(response) => {
                let status = response.status();
                let headers = response.headers().clone();
                response
                    .bytes()
                    .await
                    .map(|body| BackendResponse { status, headers, body })
            }
            Err(e) => Err(e),
        };
        let elapsed = started.elapsed();

        match result {
            Ok(response) if response.status.is_server_error() => {
                breaker.on_failure();
                self.health.record_failure(backend_name);
                tracing::warn!(
                    backend = backend_name,
                    %method,
                    status = %response.status,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Backend returned server error"
                );
                metrics::record_backend_call(backend_name, response.status.as_u16(), elapsed);
                Ok(response)
            }
            Ok(response) => {
                breaker.on_success();
                self.health.record_success(backend_name, elapsed);
                tracing::debug!(
                    backend = backend_name,
                    %method,
                    status = %response.status,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Backend call completed"
                );
                metrics::record_backend_call(backend_name, response.status.as_u16(), elapsed);
                Ok(response)
            }
            Err(e) => {
                breaker.on_failure();
                self.health.record_failure(backend_name);
                tracing::error!(backend = backend_name, %method, error = %e, "Backend call failed");
                metrics::record_backend_call(backend_name, 0, elapsed);
                if e.is_timeout() {
                    Err(GatewayError::BackendTimeout(backend_name.to_string()))
                } else {
                    Err(GatewayError::Backend {
                        backend: backend_name.to_string(),
                        message: e.to_string(),
                    })
                }
            }
        }
    }

    /// Point-in-time health of every backend. Never blocks on I/O.
    pub fn perform_health_check(&self) -> HashMap<String, HealthRecord> {
        self.health.snapshot()
    }

    pub fn breaker_snapshot(&self) -> HashMap<String, BreakerSnapshot> {
        self.breakers.snapshot()
    }

    /// Health and breaker state side by side, sorted by backend name.
    pub fn report(&self) -> Vec<BackendReport> {
        let mut report: Vec<BackendReport> = self
            .backends
            .all()
            .into_iter()
            .map(|backend| BackendReport {
                health: self.health.get(&backend.name).unwrap_or_default(),
                circuit: self.breakers.get(&backend.name).map(|b| b.snapshot()),
                url: backend.base_url.to_string(),
                name: backend.name.clone(),
            })
            .collect();
        report.sort_by(|a, b| a.name.cmp(&b.name));
        report
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BackendReport {
    pub name: String,
    pub url: String,
    pub health: HealthRecord,
    pub circuit: Option<BreakerSnapshot>,
}

/// JSON defaults first, caller headers override them.
fn merge_headers(mut headers: HeaderMap) -> HeaderMap {
    headers
        .entry(header::CONTENT_TYPE)
        .or_insert(HeaderValue::from_static("application/json"));
    headers
        .entry(header::ACCEPT)
        .or_insert(HeaderValue::from_static("application/json"));
    headers
}
