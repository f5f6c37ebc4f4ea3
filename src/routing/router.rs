//! Compiled proxy routes.
//!
//! # Responsibilities
//! - Hold the immutable route table built from config
//! - Produce the axum path patterns for each route
//! - Rewrite inbound paths for the backend
//!
//! # Design Decisions
//! - Immutable after construction (shared via `Arc` without locks)
//! - Matching itself is delegated to axum; a route owns `prefix` and `prefix/{*rest}`
//! - Longest prefix first, so logging and admin listings read top-down

use axum::http::Uri;

use crate::config::{AuthMode, RouteConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub path_prefix: String,
    pub backend: String,
    pub upstream_prefix: String,
    pub auth: AuthMode,
    pub phi_audit: bool,
}

impl Route {
    pub fn from_config(config: &RouteConfig) -> Self {
        Self {
            path_prefix: config.path_prefix.trim_end_matches('/').to_string(),
            backend: config.backend.clone(),
            upstream_prefix: config.upstream_prefix.trim_end_matches('/').to_string(),
            auth: config.auth,
            phi_audit: config.phi_audit,
        }
    }

    /// Axum patterns served by this route: the exact prefix and everything below it.
    pub fn patterns(&self) -> [String; 2] {
        if self.path_prefix.is_empty() {
            ["/".to_string(), "/{*rest}".to_string()]
        } else {
            [self.path_prefix.clone(), format!("{}/{{*rest}}", self.path_prefix)]
        }
    }

    /// Strip the route prefix, prepend the upstream prefix, keep the query.
    ///
    /// `/chat/rooms/1?x=1` on prefix `/chat` with upstream `/api/v1`
    /// becomes `/api/v1/rooms/1?x=1`.
    pub fn rewrite(&self, uri: &Uri) -> String {
        let path = uri.path();
        let rest = path.strip_prefix(self.path_prefix.as_str()).unwrap_or(path);
        let rest = if rest.is_empty() { "/" } else { rest };

        let mut target = String::with_capacity(self.upstream_prefix.len() + rest.len() + 16);
        target.push_str(&self.upstream_prefix);
        if !rest.starts_with('/') {
            target.push('/');
        }
        target.push_str(rest);

        if let Some(query) = uri.query() {
            target.push('?');
            target.push_str(query);
        }
        target
    }
}

/// Immutable set of proxy routes.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn from_config(configs: &[RouteConfig]) -> Self {
        let mut routes: Vec<Route> = configs.iter().map(Route::from_config).collect();
        routes.sort_by(|a, b| b.path_prefix.len().cmp(&a.path_prefix.len()));
        Self { routes }
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(prefix: &str, upstream: &str) -> Route {
        Route::from_config(&RouteConfig {
            path_prefix: prefix.into(),
            backend: "chat".into(),
            upstream_prefix: upstream.into(),
            auth: AuthMode::Optional,
            phi_audit: false,
        })
    }

    #[test]
    fn test_rewrite_strips_prefix() {
        let r = route("/chat", "");
        assert_eq!(r.rewrite(&"/chat/rooms/1".parse().unwrap()), "/rooms/1");
        assert_eq!(r.rewrite(&"/chat".parse().unwrap()), "/");
    }

    #[test]
    fn test_rewrite_with_upstream_prefix_and_query() {
        let r = route("/chat", "/api/v1/");
        assert_eq!(
            r.rewrite(&"/chat/messages?limit=5".parse().unwrap()),
            "/api/v1/messages?limit=5"
        );
        assert_eq!(r.rewrite(&"/chat?x=1".parse().unwrap()), "/api/v1/?x=1");
    }

    #[test]
    fn test_patterns() {
        assert_eq!(route("/chat", "").patterns(), ["/chat".to_string(), "/chat/{*rest}".to_string()]);
        assert_eq!(route("/", "").patterns(), ["/".to_string(), "/{*rest}".to_string()]);
    }

    #[test]
    fn test_table_orders_longest_prefix_first() {
        let table = RouteTable::from_config(&[
            RouteConfig {
                path_prefix: "/chat".into(),
                backend: "chat".into(),
                upstream_prefix: String::new(),
                auth: AuthMode::Optional,
                phi_audit: true,
            },
            RouteConfig {
                path_prefix: "/chat/admin".into(),
                backend: "admin".into(),
                upstream_prefix: String::new(),
                auth: AuthMode::Required,
                phi_audit: false,
            },
        ]);

        let prefixes: Vec<&str> = table.routes().iter().map(|r| r.path_prefix.as_str()).collect();
        assert_eq!(prefixes, vec!["/chat/admin", "/chat"]);
        assert_eq!(table.len(), 2);
    }
}
