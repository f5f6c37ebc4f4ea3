//! Admin API, served on its own listener.
//!
//! Every endpoint requires `Authorization: Bearer <admin.api_key>`.

pub mod auth;
pub mod handlers;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use self::auth::{admin_auth_middleware, AdminKey};
use self::handlers::*;
use crate::config::AdminConfig;
use crate::http::server::AppState;

pub fn admin_router(state: AppState, config: &AdminConfig) -> Router {
    let key = Arc::new(AdminKey::new(&config.api_key));
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/backends", get(get_backends))
        .route("/admin/audit", get(get_audit))
        .route("/admin/audit/stats", get(get_audit_stats))
        .route("/admin/tokens", post(issue_token))
        .layer(from_fn_with_state(key, admin_auth_middleware))
        .with_state(state)
}
