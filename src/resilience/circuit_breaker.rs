//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: backend assumed down, requests fail fast
//! - Half-Open: testing if backend recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= max_failures
//! Open → Half-Open: reset_timeout elapsed since last failure (checked on can_execute)
//! Half-Open → Closed: trial request succeeds
//! Half-Open → Open: trial request fails
//! ```
//!
//! # Design Decisions
//! - Per-backend circuit breaker (not global), each behind its own lock
//! - Fail fast in Open state (no waiting for timeout)
//! - Registry is built once from the backend list; no insert at request time

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use crate::config::CircuitBreakerConfig;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
}

/// Point-in-time view of a breaker for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub max_failures: u32,
    pub reset_timeout_secs: u64,
    /// Milliseconds since the last recorded failure.
    pub last_failure_ms_ago: Option<u64>,
}

/// A single backend's failure/recovery state machine.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    max_failures: u32,
    reset_timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, max_failures: u32, reset_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            max_failures: max_failures.max(1),
            reset_timeout,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure_at: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a call may proceed. Moves Open → Half-Open once the reset timeout has elapsed.
    pub fn can_execute(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure_at
                    .map(|at| at.elapsed() >= self.reset_timeout)
                    .unwrap_or(true);
                if elapsed {
                    inner.state = CircuitState::HalfOpen;
                    tracing::info!(backend = %self.name, "Circuit half-open, allowing trial request");
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful call.
    pub fn on_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Closed {
            tracing::info!(backend = %self.name, from = %inner.state, "Circuit closed");
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
    }

    /// Record a failed call.
    pub fn on_failure(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.last_failure_at = Some(Instant::now());

        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                tracing::warn!(backend = %self.name, "Trial request failed, circuit re-opened");
            }
            CircuitState::Closed if inner.consecutive_failures >= self.max_failures => {
                inner.state = CircuitState::Open;
                tracing::warn!(
                    backend = %self.name,
                    failures = inner.consecutive_failures,
                    "Circuit opened"
                );
            }
            _ => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            max_failures: self.max_failures,
            reset_timeout_secs: self.reset_timeout.as_secs(),
            last_failure_ms_ago: inner
                .last_failure_at
                .map(|at| at.elapsed().as_millis() as u64),
        }
    }
}

/// Fixed set of breakers, one per known backend.
#[derive(Debug)]
pub struct BreakerRegistry {
    breakers: HashMap<String, CircuitBreaker>,
}

impl BreakerRegistry {
    pub fn new<'a>(names: impl IntoIterator<Item = &'a str>, config: &CircuitBreakerConfig) -> Self {
        let breakers = names
            .into_iter()
            .map(|name| {
                (
                    name.to_string(),
                    CircuitBreaker::new(name, config.max_failures, config.reset_timeout()),
                )
            })
            .collect();
        Self { breakers }
    }

    pub fn get(&self, name: &str) -> Option<&CircuitBreaker> {
        self.breakers.get(name)
    }

    pub fn snapshot(&self) -> HashMap<String, BreakerSnapshot> {
        self.breakers
            .iter()
            .map(|(name, b)| (name.clone(), b.snapshot()))
            .collect()
    }
}
