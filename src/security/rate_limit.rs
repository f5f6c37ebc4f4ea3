//! Fixed-bucket rate limiting over the shared store, with an in-process fallback.
//!
//! # Algorithm
//! ```text
//! bucket = unix_now / window_secs
//! count  = INCR ratelimit:{key}:{window_secs}:{bucket}
//! count == 1  → EXPIRE key window
//! count > limit → reject, retry after the bucket ends
//! ```
//! When the store errors, the same key is checked against a per-key log of
//! request timestamps held in this process (sliding window). Logs whose
//! newest hit has aged out of their window are swept at most once per
//! [`FALLBACK_SWEEP_SECS`].
//!
//! # Design Decisions
//! - Key is the authenticated user id when present, otherwise the client IP
//! - Windows are checked in order; each checked window records the hit,
//!   and checking stops at the first rejection
//! - Store failures degrade to local limiting, never to "allow everything"

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::{RateLimitConfig, WindowConfig};
use crate::error::GatewayError;
use crate::http::request::{client_ip, trace_id};
use crate::observability::metrics;
use crate::security::auth::AuthContext;
use crate::store::{KvStore, StoreError};

/// Outcome of one window check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    /// Unix seconds at which the window resets.
    pub reset_at: u64,
    /// Seconds until a retry can succeed; 0 when allowed.
    pub retry_after: u64,
}

/// Minimum spacing, in seconds, between sweeps of the fallback logs.
pub const FALLBACK_SWEEP_SECS: u64 = 60;

/// Hits for one `(key, window)` pair, oldest first.
#[derive(Debug, Default)]
struct HitLog {
    window: Duration,
    hits: VecDeque<Duration>,
}

impl HitLog {
    fn is_stale(&self, now: Duration) -> bool {
        self.hits
            .back()
            .map_or(true, |newest| *newest <= now.saturating_sub(self.window))
    }
}

pub struct RateLimiter {
    store: Arc<dyn KvStore>,
    fallback: DashMap<String, HitLog>,
    last_sweep_secs: AtomicU64,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KvStore>, config: RateLimitConfig) -> Self {
        Self {
            store,
            fallback: DashMap::new(),
            last_sweep_secs: AtomicU64::new(0),
            config,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Paths matching an exempt entry skip limiting. A trailing `*` matches by prefix.
    pub fn is_exempt(&self, path: &str) -> bool {
        self.config.exempt_paths.iter().any(|pattern| match pattern.strip_suffix('*') {
            Some(prefix) => path.starts_with(prefix),
            None => path == pattern,
        })
    }

    pub async fn check(&self, key: &str, limit: u64, window: Duration) -> RateLimitDecision {
        self.check_at(key, limit, window, SystemTime::now()).await
    }

    /// Check and record one hit for `key` at wall-clock time `now`.
    pub async fn check_at(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
        now: SystemTime,
    ) -> RateLimitDecision {
        let since_epoch = now.duration_since(UNIX_EPOCH).unwrap_or_default();
        match self.check_store(key, limit, window, since_epoch).await {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(error = %e, "Rate limit store unavailable, using local fallback");
                self.check_local(key, limit, window, since_epoch)
            }
        }
    }

    async fn check_store(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
        now: Duration,
    ) -> Result<RateLimitDecision, StoreError> {
        let window_secs = window.as_secs().max(1);
        let now_secs = now.as_secs();
        let bucket = now_secs / window_secs;
        let store_key = format!("ratelimit:{key}:{window_secs}:{bucket}");

        let count = self.store.incr(&store_key).await?.max(0) as u64;
        if count == 1 {
            self.store.expire(&store_key, Duration::from_secs(window_secs)).await?;
        }

        let reset_at = (bucket + 1) * window_secs;
        Ok(decide(count, limit, reset_at, reset_at.saturating_sub(now_secs)))
    }

    fn check_local(&self, key: &str, limit: u64, window: Duration, now: Duration) -> RateLimitDecision {
        self.maybe_sweep(now);

        let window = window.max(Duration::from_secs(1));
        let local_key = format!("{key}:{}", window.as_secs());
        let mut log = self.fallback.entry(local_key).or_default();
        log.window = window;

        let cutoff = now.saturating_sub(window);
        while log.hits.front().is_some_and(|t| *t <= cutoff) {
            log.hits.pop_front();
        }
        log.hits.push_back(now);

        let oldest = log.hits.front().copied().unwrap_or(now);
        let reset = oldest + window;
        let wait = reset.saturating_sub(now);
        let wait_secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
        decide(log.hits.len() as u64, limit, reset.as_secs(), wait_secs)
    }

    /// Drop fallback logs with no hit inside their window.
    ///
    /// Runs at most once per [`FALLBACK_SWEEP_SECS`]; only the caller that
    /// wins the timestamp swap sweeps. Must not hold a `fallback` guard.
    fn maybe_sweep(&self, now: Duration) {
        let now_secs = now.as_secs();
        let last = self.last_sweep_secs.load(Ordering::Relaxed);
        if now_secs < last.saturating_add(FALLBACK_SWEEP_SECS) {
            return;
        }
        if self
            .last_sweep_secs
            .compare_exchange(last, now_secs, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
        let before = self.fallback.len();
        self.fallback.retain(|_, log| !log.is_stale(now));
        let dropped = before.saturating_sub(self.fallback.len());
        if dropped > 0 {
            tracing::debug!(dropped, remaining = self.fallback.len(), "Swept idle fallback rate-limit logs");
        }
    }

    #[cfg(test)]
    fn fallback_len(&self) -> usize {
        self.fallback.len()
    }

    /// Run the configured windows for `key` in order.
    ///
    /// Every window checked records the hit. Returns the tightest passing
    /// decision, or the first rejection without touching later windows.
    pub async fn check_all(&self, key: &str) -> Result<Option<RateLimitDecision>, GatewayError> {
        let mut tightest: Option<RateLimitDecision> = None;
        for WindowConfig { limit, window_secs } in &self.config.windows {
            let decision = self.check(key, *limit, Duration::from_secs(*window_secs)).await;
            if !decision.allowed {
                metrics::record_rate_limited(*window_secs);
                tracing::warn!(client = %key, window_secs, limit, "Rate limit exceeded");
                return Err(GatewayError::RateLimited {
                    limit: decision.limit,
                    reset_at: decision.reset_at,
                    retry_after: decision.retry_after,
                });
            }
            if tightest.map_or(true, |t| decision.remaining < t.remaining) {
                tightest = Some(decision);
            }
        }
        Ok(tightest)
    }
}

fn decide(count: u64, limit: u64, reset_at: u64, wait_secs: u64) -> RateLimitDecision {
    let allowed = count <= limit;
    RateLimitDecision {
        allowed,
        limit,
        remaining: limit.saturating_sub(count),
        reset_at,
        retry_after: if allowed { 0 } else { wait_secs.max(1) },
    }
}

fn set_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    headers.insert("x-ratelimit-reset", HeaderValue::from(decision.reset_at));
}

/// Admission control for every non-exempt request.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !limiter.config().enabled || limiter.is_exempt(request.uri().path()) {
        return next.run(request).await;
    }

    let key = match request.extensions().get::<AuthContext>() {
        Some(ctx) => format!("user:{}", ctx.user_id),
        None => format!("ip:{}", client_ip(&request)),
    };

    match limiter.check_all(&key).await {
        Ok(decision) => {
            let mut response = next.run(request).await;
            if let Some(decision) = decision {
                set_limit_headers(response.headers_mut(), &decision);
            }
            response
        }
        Err(e) => e.into_response_with_trace(trace_id(&request).as_deref()),
    }
}
