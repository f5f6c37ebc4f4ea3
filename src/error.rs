//! Gateway error taxonomy and its HTTP mapping.
//!
//! Every per-request failure ends up here and is rendered as
//! `{error, message, timestamp, trace_id}` with the matching status code.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;

use crate::security::auth::AuthError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Unauthorized(#[from] AuthError),

    #[error("rate limit exceeded, retry after {retry_after}s")]
    RateLimited {
        limit: u64,
        reset_at: u64,
        retry_after: u64,
    },

    #[error("backend '{0}' is temporarily unavailable")]
    CircuitOpen(String),

    #[error("unknown backend '{0}'")]
    UnknownBackend(String),

    #[error("backend '{backend}' request failed: {message}")]
    Backend { backend: String, message: String },

    #[error("backend '{0}' timed out")]
    BackendTimeout(String),

    #[error("access to protected health information requires authentication")]
    PhiAccessDenied { audit_id: String },

    #[error("no route matches '{0}'")]
    NotFound(String),

    #[error("request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    pub timestamp: String,
    pub trace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_id: Option<String>,
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Unauthorized(_) | GatewayError::PhiAccessDenied { .. } => {
                StatusCode::UNAUTHORIZED
            }
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::CircuitOpen(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::UnknownBackend(_) | GatewayError::Backend { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::BackendTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Store(_) | GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Unauthorized(_) => "unauthorized",
            GatewayError::RateLimited { .. } => "rate_limit_exceeded",
            GatewayError::CircuitOpen(_) => "service_unavailable",
            GatewayError::UnknownBackend(_) => "unknown_backend",
            GatewayError::Backend { .. } => "bad_gateway",
            GatewayError::BackendTimeout(_) => "gateway_timeout",
            GatewayError::PhiAccessDenied { .. } => "phi_access_denied",
            GatewayError::NotFound(_) => "not_found",
            GatewayError::PayloadTooLarge(_) => "payload_too_large",
            GatewayError::BadRequest(_) => "bad_request",
            GatewayError::Store(_) | GatewayError::Internal(_) => "internal_error",
        }
    }

    /// Message safe to show to the caller.
    fn public_message(&self) -> String {
        match self {
            GatewayError::Backend { backend, .. } => format!("backend '{backend}' request failed"),
            GatewayError::Store(_) | GatewayError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }

    /// Render with the request's trace id.
    pub fn into_response_with_trace(self, trace_id: Option<&str>) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, trace_id, "Request failed");
        } else {
            tracing::debug!(error = %self, trace_id, "Request rejected");
        }

        let audit_id = match &self {
            GatewayError::PhiAccessDenied { audit_id } => Some(audit_id.clone()),
            _ => None,
        };
        let body = ErrorBody {
            error: self.code(),
            message: self.public_message(),
            timestamp: Utc::now().to_rfc3339(),
            trace_id: trace_id.map(str::to_string),
            audit_id: audit_id.clone(),
        };

        let mut response = (status, Json(body)).into_response();
        let headers = response.headers_mut();
        match &self {
            GatewayError::RateLimited {
                limit,
                reset_at,
                retry_after,
            } => {
                headers.insert(header::RETRY_AFTER, HeaderValue::from(*retry_after));
                headers.insert("x-ratelimit-limit", HeaderValue::from(*limit));
                headers.insert("x-ratelimit-remaining", HeaderValue::from(0u64));
                headers.insert("x-ratelimit-reset", HeaderValue::from(*reset_at));
            }
            GatewayError::Unauthorized(_) => {
                headers.insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            GatewayError::PhiAccessDenied { .. } => {
                headers.insert("x-hipaa-compliant", HeaderValue::from_static("false"));
                if let Some(id) = audit_id.and_then(|id| HeaderValue::from_str(&id).ok()) {
                    headers.insert("x-hipaa-audit-id", id);
                }
            }
            _ => {}
        }
        response
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        self.into_response_with_trace(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(GatewayError::CircuitOpen("chat".into()).status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(GatewayError::UnknownBackend("x".into()).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            GatewayError::Unauthorized(AuthError::MissingToken).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            GatewayError::PhiAccessDenied { audit_id: "a".into() }.status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_rate_limited_headers() {
        let response = GatewayError::RateLimited {
            limit: 10,
            reset_at: 1_700_000_000,
            retry_after: 3,
        }
        .into_response_with_trace(Some("req-1"));

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["retry-after"], "3");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
    }

    #[test]
    fn test_internal_details_hidden() {
        let err = GatewayError::Internal("db password wrong".into());
        assert_eq!(err.public_message(), "internal error");
    }
}
