//! Token issuance, validation and identity middleware.
//!
//! # Middleware variants
//! - `require_auth`: missing/invalid/expired token → 401, request never reaches a backend
//! - `optional_auth`: invalid or missing token → request continues without identity
//!
//! # Design Decisions
//! - HS256 only; tokens declaring any other algorithm are rejected before verification
//! - Validity is a pure function of signature, issuer and time
//! - Identity travels in request extensions as [`AuthContext`]

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::GatewayError;
use crate::http::request::trace_id;

const ALGORITHM: Algorithm = Algorithm::HS256;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub jti: String, // unique per token
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("malformed authorization header")]
    MalformedHeader,

    #[error("token algorithm not accepted")]
    AlgorithmRejected,

    #[error("token expired")]
    Expired,

    #[error("invalid token")]
    Invalid,

    #[error("failed to sign token")]
    Signing,
}

/// Authenticated caller, attached to request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: String,
    pub token_id: String,
}

/// Issues and validates HS256 access tokens.
pub struct AuthGuard {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    access_token_ttl: Duration,
}

impl std::fmt::Debug for AuthGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGuard")
            .field("issuer", &self.issuer)
            .field("access_token_ttl", &self.access_token_ttl)
            .finish_non_exhaustive()
    }
}

impl AuthGuard {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            issuer: config.issuer.clone(),
            access_token_ttl: Duration::seconds(config.access_token_ttl_secs),
        }
    }

    /// Create an access token for `user_id`.
    pub fn issue_token(&self, user_id: &str) -> Result<(String, DateTime<Utc>), AuthError> {
        let now = Utc::now();
        let expires_at = now + self.access_token_ttl;
        let claims = Claims {
            sub: user_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
        };

        let token = encode(&Header::new(ALGORITHM), &claims, &self.encoding_key).map_err(|e| {
            tracing::error!(error = %e, "Failed to encode JWT");
            AuthError::Signing
        })?;
        Ok((token, expires_at))
    }

    /// Verify signature, algorithm, issuer and expiry.
    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        let header = decode_header(token).map_err(|_| AuthError::Invalid)?;
        if header.alg != ALGORITHM {
            tracing::warn!(alg = ?header.alg, "Rejected token with unexpected algorithm");
            return Err(AuthError::AlgorithmRejected);
        }

        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = 0;
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Invalid,
            }
        })?;

        // `exp` must be strictly in the future.
        if data.claims.exp <= Utc::now().timestamp() {
            return Err(AuthError::Expired);
        }
        Ok(data.claims)
    }

    /// Resolve the caller from the `Authorization` header.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
        let token = bearer_token(headers)?;
        let claims = self.validate(token)?;
        Ok(AuthContext {
            user_id: claims.sub,
            token_id: claims.jti,
        })
    }
}

/// Extract the token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::MalformedHeader)?;

    let (scheme, token) = value.split_once(' ').ok_or(AuthError::MalformedHeader)?;
    if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
        return Err(AuthError::MalformedHeader);
    }
    Ok(token.trim())
}

/// Attach identity when the token is valid; otherwise continue anonymously.
pub async fn optional_auth(
    State(guard): State<Arc<AuthGuard>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    match guard.authenticate(request.headers()) {
        Ok(ctx) => {
            request.extensions_mut().insert(ctx);
        }
        Err(AuthError::MissingToken) => {}
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring invalid token on optional route");
        }
    }
    next.run(request).await
}

/// Reject the request unless it carries a valid token.
pub async fn require_auth(
    State(guard): State<Arc<AuthGuard>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if request.extensions().get::<AuthContext>().is_some() {
        return next.run(request).await;
    }
    match guard.authenticate(request.headers()) {
        Ok(ctx) => {
            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
        Err(e) => {
            tracing::info!(error = %e, path = %request.uri().path(), "Authentication required");
            GatewayError::Unauthorized(e).into_response_with_trace(trace_id(&request).as_deref())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn guard() -> AuthGuard {
        AuthGuard::new(&AuthConfig {
            jwt_secret: "test-secret-test-secret-test-secret".into(),
            issuer: "care-gateway".into(),
            access_token_ttl_secs: 3600,
        })
    }

    #[test]
    fn test_round_trip() {
        let g = guard();
        let (token, expires_at) = g.issue_token("user-42").unwrap();
        assert!(expires_at > Utc::now());

        let claims = g.validate(&token).unwrap();
        assert_eq!(claims.sub, "user-42");
        assert_eq!(claims.iss, "care-gateway");
    }

    #[test]
    fn test_expired_token_rejected() {
        let g = AuthGuard::new(&AuthConfig {
            jwt_secret: "test-secret-test-secret-test-secret".into(),
            issuer: "care-gateway".into(),
            access_token_ttl_secs: -10,
        });
        let (token, _) = g.issue_token("user-42").unwrap();
        assert_eq!(g.validate(&token).unwrap_err(), AuthError::Expired);
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let g = guard();
        let (token, _) = g.issue_token("user-42").unwrap();

        // Flip one character in the middle of the signature segment.
        let at = token.rfind('.').unwrap() + 10;
        let mut bytes = token.into_bytes();
        bytes[at] = if bytes[at] == b'x' { b'y' } else { b'x' };
        let tampered = String::from_utf8(bytes).unwrap();

        assert!(g.validate(&tampered).is_err());
    }

    #[test]
    fn test_other_algorithm_rejected() {
        let g = guard();
        let claims = Claims {
            sub: "user-42".into(),
            jti: "x".into(),
            exp: Utc::now().timestamp() + 600,
            iat: Utc::now().timestamp(),
            iss: "care-gateway".into(),
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(b"test-secret-test-secret-test-secret"),
        )
        .unwrap();
        assert_eq!(g.validate(&token).unwrap_err(), AuthError::AlgorithmRejected);
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let other = AuthGuard::new(&AuthConfig {
            jwt_secret: "test-secret-test-secret-test-secret".into(),
            issuer: "someone-else".into(),
            access_token_ttl_secs: 3600,
        });
        let (token, _) = other.issue_token("user-42").unwrap();
        assert_eq!(guard().validate(&token).unwrap_err(), AuthError::Invalid);
    }

    #[test]
    fn test_bearer_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers).unwrap_err(), AuthError::MissingToken);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers).unwrap_err(), AuthError::MalformedHeader);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer abc.def"));
        assert_eq!(bearer_token(&headers).unwrap(), "abc.def");
    }
}
