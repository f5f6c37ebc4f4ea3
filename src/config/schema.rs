//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, limits).
    pub listener: ListenerConfig,

    /// Named backend services.
    pub backends: Vec<BackendConfig>,

    /// Route definitions mapping path prefixes to backends.
    pub routes: Vec<RouteConfig>,

    /// Per-backend circuit breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Health check settings.
    pub health_check: HealthCheckConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Token signing and validation.
    pub auth: AuthConfig,

    /// Session binding.
    pub session: SessionConfig,

    /// PHI detection and audit trail.
    pub phi_audit: PhiAuditConfig,

    /// Shared key-value store.
    pub store: StoreConfig,

    /// Admin API.
    pub admin: AdminConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_size: 2 * 1024 * 1024,
        }
    }
}

/// A named backend microservice.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Logical name used by routes and the dispatcher (e.g. "chat").
    pub name: String,

    /// Base URL (e.g. "http://chat-service:8001").
    pub url: String,

    /// Maximum idle pooled connections kept to this backend.
    #[serde(default = "default_max_idle")]
    pub max_idle_connections: usize,
}

fn default_max_idle() -> usize {
    32
}

/// Whether a route requires an authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    Required,
    #[default]
    Optional,
}

/// Route configuration mapping a path prefix to a backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Path prefix to match (e.g. "/chat").
    pub path_prefix: String,

    /// Backend name to forward to.
    pub backend: String,

    /// Prefix prepended to the rewritten path on the backend side.
    #[serde(default)]
    pub upstream_prefix: String,

    /// Authentication requirement.
    #[serde(default)]
    pub auth: AuthMode,

    /// Run PHI detection and auditing on request bodies.
    #[serde(default)]
    pub phi_audit: bool,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the breaker opens.
    pub max_failures: u32,

    /// Seconds to wait in the open state before allowing a trial request.
    pub reset_timeout_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            reset_timeout_secs: 60,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.reset_timeout_secs)
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable background health polling.
    pub enabled: bool,

    /// Polling interval in seconds.
    pub interval_secs: u64,

    /// Probe timeout in seconds.
    pub timeout_secs: u64,

    /// Path to probe on each backend.
    pub path: String,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            timeout_secs: 5,
            path: "/health".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Per-call timeout for backend requests in seconds.
    pub backend_secs: u64,

    /// Total inbound request timeout in seconds.
    pub request_secs: u64,

    /// Idle pooled connection timeout in seconds.
    pub idle_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            backend_secs: 30,
            request_secs: 35,
            idle_secs: 90,
        }
    }
}

/// A single rate limit window.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WindowConfig {
    /// Maximum admissions inside one window.
    pub limit: u64,

    /// Window length in seconds.
    pub window_secs: u64,
}

impl WindowConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Windows checked in order for every request.
    pub windows: Vec<WindowConfig>,

    /// Paths (exact or prefix ending in `*`) that bypass limiting.
    pub exempt_paths: Vec<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            windows: vec![
                WindowConfig { limit: 10, window_secs: 1 },
                WindowConfig { limit: 300, window_secs: 60 },
            ],
            exempt_paths: vec![
                "/health".to_string(),
                "/health/*".to_string(),
                "/docs/*".to_string(),
                "/metrics".to_string(),
            ],
        }
    }
}

/// Token configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret for HS256 tokens.
    pub jwt_secret: String,

    /// Issuer claim written and required.
    pub issuer: String,

    /// Access token lifetime in seconds.
    pub access_token_ttl_secs: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            issuer: "care-gateway".to_string(),
            access_token_ttl_secs: 3600,
        }
    }
}

/// Session configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Session lifetime, extended on every read.
    pub ttl_secs: u64,

    /// Name of the cookie carrying the session id.
    pub cookie_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 1800,
            cookie_name: "session_id".to_string(),
        }
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// PHI audit configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PhiAuditConfig {
    /// Audit entries retained in memory.
    pub capacity: usize,

    /// Characters of masked content kept in each entry.
    pub preview_chars: usize,

    /// Append entries as JSON lines to this file, in addition to the log.
    pub log_path: Option<String>,

    /// Bounded sink queue length.
    pub queue_size: usize,

    /// Sink writer tasks.
    pub workers: usize,
}

impl Default for PhiAuditConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            preview_chars: 200,
            log_path: None,
            queue_size: 1024,
            workers: 2,
        }
    }
}

/// Which key-value store backs sessions and rate-limit counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Redis,
}

/// Key-value store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    /// Redis URL when `backend = "redis"`.
    pub redis_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default log filter when RUST_LOG is unset.
    pub log_level: String,

    /// Emit JSON log lines instead of the pretty format.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "care_gateway=info,tower_http=info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
