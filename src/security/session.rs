//! Session binding over the shared TTL store.
//!
//! # Keys
//! ```text
//! session:{id}           JSON Session, TTL = session ttl (refreshed on read)
//! session:{id}:requests  request counter, atomic INCR
//! session:{id}:revoked   tombstone written on invalidate
//! ```
//!
//! # Design Decisions
//! - Sessions are independent of token validity; anonymous traffic gets one too
//! - Unknown, expired or revoked ids are never revived; a fresh id is minted instead
//! - The request counter is a separate atomic key so concurrent reads never lose counts
//! - The tombstone outlives the record, so a racing refresh cannot resurrect it

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::http::request::{client_ip, X_SESSION_ID};
use crate::security::auth::AuthContext;
use crate::store::{KvStore, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: String,
    pub user_id: Option<String>,
    pub ip_address: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub request_count: u64,
}

/// Session bound to the current request, in request extensions.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    pub user_id: Option<String>,
    pub created: bool,
}

/// Response marker: the handler ended the session, do not echo its id.
#[derive(Debug, Clone, Copy)]
pub struct SessionEnded;

pub struct SessionManager {
    store: Arc<dyn KvStore>,
    ttl: Duration,
    cookie_name: String,
}

fn record_key(id: &str) -> String {
    format!("session:{id}")
}

fn counter_key(id: &str) -> String {
    format!("session:{id}:requests")
}

fn revoked_key(id: &str) -> String {
    format!("session:{id}:revoked")
}

impl SessionManager {
    pub fn new(store: Arc<dyn KvStore>, config: &SessionConfig) -> Self {
        Self {
            store,
            ttl: config.ttl(),
            cookie_name: config.cookie_name.clone(),
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    fn chrono_ttl(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::seconds(1800))
    }

    /// Mint a new active session.
    pub async fn create(
        &self,
        user_id: Option<String>,
        ip_address: &str,
        user_agent: &str,
    ) -> Result<Session, StoreError> {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let request_count = self.store.incr(&counter_key(&id)).await?;
        self.store.expire(&counter_key(&id), self.ttl).await?;

        let session = Session {
            id,
            user_id,
            ip_address: ip_address.to_string(),
            user_agent: user_agent.to_string(),
            created_at: now,
            last_activity_at: now,
            expires_at: now + self.chrono_ttl(),
            is_active: true,
            request_count: request_count as u64,
        };
        self.write(&session).await?;
        tracing::debug!(session_id = %session.id, anonymous = session.user_id.is_none(), "Session created");
        Ok(session)
    }

    /// Look up an active session, refreshing its TTL and counting the request.
    ///
    /// Returns `None` for unknown, expired or invalidated ids.
    pub async fn get(&self, id: &str) -> Result<Option<Session>, StoreError> {
        if Uuid::parse_str(id).is_err() {
            return Ok(None);
        }
        if self.store.get(&revoked_key(id)).await?.is_some() {
            return Ok(None);
        }
        let Some(raw) = self.store.get(&record_key(id)).await? else {
            return Ok(None);
        };
        let mut session: Session =
            serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt(e.to_string()))?;

        let now = Utc::now();
        if !session.is_active || session.expires_at <= now {
            return Ok(None);
        }

        let count = self.store.incr(&counter_key(id)).await?;
        session.request_count = count as u64;
        session.last_activity_at = now;
        session.expires_at = now + self.chrono_ttl();

        // A failed refresh only shortens the session; the request still proceeds.
        if let Err(e) = self.refresh(&session).await {
            tracing::warn!(session_id = %id, error = %e, "Failed to refresh session TTL");
        }
        Ok(Some(session))
    }

    async fn refresh(&self, session: &Session) -> Result<(), StoreError> {
        self.write(session).await?;
        self.store.expire(&counter_key(&session.id), self.ttl).await?;
        Ok(())
    }

    async fn write(&self, session: &Session) -> Result<(), StoreError> {
        let raw = serde_json::to_string(session).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        self.store.set(&record_key(&session.id), &raw, self.ttl).await
    }

    /// Permanently deactivate a session. Returns false if it was not active.
    pub async fn invalidate(&self, id: &str) -> Result<bool, StoreError> {
        if Uuid::parse_str(id).is_err() {
            return Ok(false);
        }
        self.store.set(&revoked_key(id), "1", self.ttl * 2).await?;

        let Some(raw) = self.store.get(&record_key(id)).await? else {
            return Ok(false);
        };
        let mut session: Session =
            serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let was_active = session.is_active;
        session.is_active = false;
        self.write(&session).await?;

        tracing::info!(session_id = %id, "Session invalidated");
        Ok(was_active)
    }

    /// Session id from `X-Session-ID`, falling back to the session cookie.
    pub fn session_id_from(&self, headers: &HeaderMap) -> Option<String> {
        if let Some(id) = headers.get(X_SESSION_ID).and_then(|v| v.to_str().ok()) {
            if !id.is_empty() {
                return Some(id.to_string());
            }
        }
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.cookie_name)
            .map(|(_, value)| value.to_string())
    }
}

/// Bind a session to every request, minting one for first contact.
pub async fn session_middleware(
    State(manager): State<Arc<SessionManager>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let user_id = request
        .extensions()
        .get::<AuthContext>()
        .map(|ctx| ctx.user_id.clone());

    let existing = match manager.session_id_from(request.headers()) {
        Some(id) => match manager.get(&id).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(error = %e, "Session lookup failed");
                None
            }
        },
        None => None,
    };

    let context = match existing {
        Some(session) => Some(SessionContext {
            session_id: session.id,
            user_id: session.user_id.or(user_id),
            created: false,
        }),
        None => {
            let ip = client_ip(&request);
            let user_agent = request
                .headers()
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            match manager.create(user_id.clone(), &ip, &user_agent).await {
                Ok(session) => Some(SessionContext {
                    session_id: session.id,
                    user_id,
                    created: true,
                }),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to create session, continuing without one");
                    None
                }
            }
        }
    };

    if let Some(ctx) = &context {
        request.extensions_mut().insert(ctx.clone());
    }

    let mut response = next.run(request).await;

    if let Some(ctx) = context {
        if response.extensions().get::<SessionEnded>().is_none() {
            if let Ok(value) = HeaderValue::from_str(&ctx.session_id) {
                response.headers_mut().insert(X_SESSION_ID, value);
            }
            if ctx.created {
                let cookie = format!(
                    "{}={}; Path=/; HttpOnly; SameSite=Strict",
                    manager.cookie_name(),
                    ctx.session_id
                );
                if let Ok(value) = HeaderValue::from_str(&cookie) {
                    response.headers_mut().append(header::SET_COOKIE, value);
                }
            }
        }
    }
    response
}

/// `DELETE /session`: end the caller's session.
pub async fn invalidate_session(
    State(manager): State<Arc<SessionManager>>,
    request: Request<Body>,
) -> Response {
    let Some(ctx) = request.extensions().get::<SessionContext>().cloned() else {
        return (StatusCode::NOT_FOUND, Json(serde_json::json!({ "invalidated": false }))).into_response();
    };

    let invalidated = match manager.invalidate(&ctx.session_id).await {
        Ok(invalidated) => invalidated,
        Err(e) => {
            tracing::error!(session_id = %ctx.session_id, error = %e, "Failed to invalidate session");
            false
        }
    };
    let cookie = format!("{}=; Path=/; Max-Age=0; HttpOnly; SameSite=Strict", manager.cookie_name());

    let mut response = Json(serde_json::json!({ "invalidated": invalidated })).into_response();
    response.extensions_mut().insert(SessionEnded);
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
    response
}
