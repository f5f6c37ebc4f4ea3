//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (routes reference existing backends)
//! - Validate value ranges (timeouts > 0, limits > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use url::Url;

use crate::config::schema::GatewayConfig;

/// Shortest accepted HMAC secret, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("auth.jwt_secret is missing")]
    MissingSecret,

    #[error("auth.jwt_secret must be at least {MIN_SECRET_LEN} bytes")]
    WeakSecret,

    #[error("backend '{name}' has an invalid url '{url}'")]
    InvalidBackendUrl { name: String, url: String },

    #[error("backend '{0}' is defined more than once")]
    DuplicateBackend(String),

    #[error("route '{prefix}' references unknown backend '{backend}'")]
    UnknownBackend { prefix: String, backend: String },

    #[error("route prefix '{0}' must start with '/' and not end with '/'")]
    InvalidPrefix(String),

    #[error("route prefix '{0}' is defined more than once")]
    DuplicateRoute(String),

    #[error("route prefix '{0}' collides with a gateway endpoint")]
    ReservedPrefix(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Prefixes served by the gateway itself.
const RESERVED_PREFIXES: [&str; 2] = ["/health", "/session"];

/// Validate a configuration, collecting every error found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.auth.jwt_secret.is_empty() {
        errors.push(ValidationError::MissingSecret);
    } else if config.auth.jwt_secret.len() < MIN_SECRET_LEN {
        errors.push(ValidationError::WeakSecret);
    }

    let mut names = HashSet::new();
    for backend in &config.backends {
        if !names.insert(backend.name.as_str()) {
            errors.push(ValidationError::DuplicateBackend(backend.name.clone()));
        }
        let valid = Url::parse(&backend.url)
            .map(|u| matches!(u.scheme(), "http" | "https") && u.host().is_some())
            .unwrap_or(false);
        if !valid {
            errors.push(ValidationError::InvalidBackendUrl {
                name: backend.name.clone(),
                url: backend.url.clone(),
            });
        }
    }

    let mut prefixes = HashSet::new();
    for route in &config.routes {
        let prefix = &route.path_prefix;
        if !prefix.starts_with('/') || (prefix.len() > 1 && prefix.ends_with('/')) {
            errors.push(ValidationError::InvalidPrefix(prefix.clone()));
        }
        if !prefixes.insert(prefix.as_str()) {
            errors.push(ValidationError::DuplicateRoute(prefix.clone()));
        }
        if RESERVED_PREFIXES
            .iter()
            .any(|r| prefix == r || prefix.strip_prefix(r).is_some_and(|rest| rest.starts_with('/')))
        {
            errors.push(ValidationError::ReservedPrefix(prefix.clone()));
        }
        if !names.contains(route.backend.as_str()) {
            errors.push(ValidationError::UnknownBackend {
                prefix: prefix.clone(),
                backend: route.backend.clone(),
            });
        }
    }

    if config.circuit_breaker.max_failures == 0 {
        errors.push(ValidationError::Zero("circuit_breaker.max_failures"));
    }
    if config.timeouts.backend_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.backend_secs"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.request_secs"));
    }
    if config.session.ttl_secs == 0 {
        errors.push(ValidationError::Zero("session.ttl_secs"));
    }
    if config.phi_audit.capacity == 0 {
        errors.push(ValidationError::Zero("phi_audit.capacity"));
    }
    for window in &config.rate_limit.windows {
        if window.limit == 0 || window.window_secs == 0 {
            errors.push(ValidationError::Zero("rate_limit.windows"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{BackendConfig, RouteConfig};

    fn valid() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.auth.jwt_secret = "k".repeat(MIN_SECRET_LEN);
        config.backends.push(BackendConfig {
            name: "chat".into(),
            url: "http://127.0.0.1:8001".into(),
            max_idle_connections: 8,
        });
        config.routes.push(RouteConfig {
            path_prefix: "/chat".into(),
            backend: "chat".into(),
            upstream_prefix: String::new(),
            auth: Default::default(),
            phi_audit: true,
        });
        config
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = valid();
        config.auth.jwt_secret.clear();
        config.backends[0].url = "not a url".into();
        config.routes[0].backend = "billing".into();

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::MissingSecret));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::InvalidBackendUrl { .. })));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::UnknownBackend { .. })));
    }

    #[test]
    fn test_duplicate_backend_and_bad_prefix() {
        let mut config = valid();
        config.backends.push(config.backends[0].clone());
        config.routes[0].path_prefix = "chat/".into();

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::DuplicateBackend("chat".into())));
        assert!(errors.contains(&ValidationError::InvalidPrefix("chat/".into())));
    }

    #[test]
    fn test_route_prefix_collisions() {
        let mut config = valid();
        config.routes.push(config.routes[0].clone());
        let mut health = config.routes[0].clone();
        health.path_prefix = "/health/deep".into();
        config.routes.push(health);

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::DuplicateRoute("/chat".into())));
        assert!(errors.contains(&ValidationError::ReservedPrefix("/health/deep".into())));
    }

    #[test]
    fn test_weak_secret() {
        let mut config = valid();
        config.auth.jwt_secret = "short".into();
        assert_eq!(validate_config(&config).unwrap_err(), vec![ValidationError::WeakSecret]);
    }
}
