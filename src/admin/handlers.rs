use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::compliance::{AuditStats, PhiAuditEntry};
use crate::config::AuthMode;
use crate::dispatch::BackendReport;
use crate::error::GatewayError;
use crate::http::server::AppState;

const DEFAULT_AUDIT_LIMIT: usize = 50;

#[derive(Serialize)]
pub struct RouteSummary {
    pub prefix: String,
    pub backend: String,
    pub auth: AuthMode,
    pub phi_audit: bool,
}

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub backends: usize,
    pub routes: Vec<RouteSummary>,
    pub audit_entries: usize,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let routes = state
        .routes
        .routes()
        .iter()
        .map(|r| RouteSummary {
            prefix: r.path_prefix.clone(),
            backend: r.backend.clone(),
            auth: r.auth,
            phi_audit: r.phi_audit,
        })
        .collect();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started_at.elapsed().as_secs(),
        backends: state.dispatcher.backends().len(),
        routes,
        audit_entries: state.auditor.trail().len(),
    })
}

pub async fn get_backends(State(state): State<AppState>) -> Json<Vec<BackendReport>> {
    Json(state.dispatcher.report())
}

#[derive(Deserialize)]
pub struct AuditQuery {
    pub limit: Option<usize>,
}

pub async fn get_audit(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Json<Vec<PhiAuditEntry>> {
    let limit = query.limit.unwrap_or(DEFAULT_AUDIT_LIMIT);
    Json(state.auditor.trail().recent(limit))
}

pub async fn get_audit_stats(State(state): State<AppState>) -> Json<AuditStats> {
    Json(state.auditor.trail().stats())
}

#[derive(Deserialize)]
pub struct TokenRequest {
    pub user_id: String,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_at: DateTime<Utc>,
}

pub async fn issue_token(
    State(state): State<AppState>,
    Json(request): Json<TokenRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), GatewayError> {
    let user_id = request.user_id.trim();
    if user_id.is_empty() {
        return Err(GatewayError::BadRequest("user_id must not be empty".into()));
    }

    let (access_token, expires_at) = state
        .auth
        .issue_token(user_id)
        .map_err(|e| GatewayError::Internal(e.to_string()))?;
    tracing::info!(user_id, "Issued access token via admin API");

    Ok((
        StatusCode::CREATED,
        Json(TokenResponse {
            access_token,
            token_type: "Bearer",
            expires_at,
        }),
    ))
}
