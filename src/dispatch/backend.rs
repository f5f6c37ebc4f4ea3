//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single named backend service
//! - Own the pooled HTTP client used to reach it
//! - Build outbound URLs from rewritten paths

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::config::{BackendConfig, TimeoutConfig};

/// Identifies the gateway to backends.
pub const USER_AGENT: &str = concat!("care-gateway/", env!("CARGO_PKG_VERSION"));

/// Error raised while building backends at startup.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend '{name}' has an invalid url: {source}")]
    InvalidUrl {
        name: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to build HTTP client for '{name}': {source}")]
    Client {
        name: String,
        #[source]
        source: reqwest::Error,
    },
}

/// A single backend service.
#[derive(Debug)]
pub struct Backend {
    pub name: String,
    pub base_url: Url,
    pub client: reqwest::Client,
}

impl Backend {
    pub fn from_config(config: &BackendConfig, timeouts: &TimeoutConfig) -> Result<Self, BackendError> {
        let base_url = Url::parse(&config.url).map_err(|source| BackendError::InvalidUrl {
            name: config.name.clone(),
            source,
        })?;

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .timeout(Duration::from_secs(timeouts.backend_secs))
            .pool_max_idle_per_host(config.max_idle_connections)
            .pool_idle_timeout(Duration::from_secs(timeouts.idle_secs))
            .no_proxy()
            .build()
            .map_err(|source| BackendError::Client {
                name: config.name.clone(),
                source,
            })?;

        Ok(Self {
            name: config.name.clone(),
            base_url,
            client,
        })
    }

    /// Join a path (and query) onto the base URL, keeping any base path.
    pub fn url_for(&self, path_and_query: &str) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        if path_and_query.starts_with('/') {
            format!("{base}{path_and_query}")
        } else {
            format!("{base}/{path_and_query}")
        }
    }
}

/// Backends looked up by logical name.
#[derive(Debug, Default)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<Backend>>,
}

impl BackendRegistry {
    pub fn from_config(configs: &[BackendConfig], timeouts: &TimeoutConfig) -> Result<Self, BackendError> {
        let mut backends = HashMap::new();
        for config in configs {
            let backend = Backend::from_config(config, timeouts)?;
            tracing::debug!(backend = %backend.name, url = %backend.base_url, "Registered backend");
            backends.insert(backend.name.clone(), Arc::new(backend));
        }
        Ok(Self { backends })
    }

    pub fn get(&self, name: &str) -> Option<Arc<Backend>> {
        self.backends.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.backends.keys().map(String::as_str)
    }

    /// All backends, for health polling.
    pub fn all(&self) -> Vec<Arc<Backend>> {
        self.backends.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> BackendConfig {
        BackendConfig {
            name: "chat".into(),
            url: url.into(),
            max_idle_connections: 4,
        }
    }

    #[test]
    fn test_url_join() {
        let b = Backend::from_config(&config("http://chat:8001"), &TimeoutConfig::default()).unwrap();
        assert_eq!(b.url_for("/messages?x=1"), "http://chat:8001/messages?x=1");

        let b = Backend::from_config(&config("http://chat:8001/api/"), &TimeoutConfig::default()).unwrap();
        assert_eq!(b.url_for("/messages"), "http://chat:8001/api/messages");
        assert_eq!(b.url_for("messages"), "http://chat:8001/api/messages");
    }

    #[test]
    fn test_invalid_url() {
        let err = Backend::from_config(&config("::nope"), &TimeoutConfig::default()).unwrap_err();
        assert!(matches!(err, BackendError::InvalidUrl { .. }));
    }

    #[test]
    fn test_registry_lookup() {
        let registry = BackendRegistry::from_config(&[config("http://chat:8001")], &TimeoutConfig::default()).unwrap();
        assert!(registry.get("chat").is_some());
        assert!(registry.get("billing").is_none());
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["chat"]);
    }
}
