//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize, environment overrides)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → shared by value/Arc with all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Secrets may come from the environment instead of the file
//! - Any validation error is fatal at startup

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, AuthConfig, AuthMode, BackendConfig, CircuitBreakerConfig, GatewayConfig,
    HealthCheckConfig, ListenerConfig, ObservabilityConfig, PhiAuditConfig, RateLimitConfig,
    RouteConfig, SessionConfig, StoreBackend, StoreConfig, TimeoutConfig, WindowConfig,
};
