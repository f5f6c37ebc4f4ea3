//! Admin API behind its bearer key, driven in-process with `oneshot`.

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use care_gateway::admin::admin_router;
use care_gateway::config::AdminConfig;
use care_gateway::store::MemoryStore;
use care_gateway::{build_router, AppState};

mod common;

const API_KEY: &str = "admin-test-key";

fn state() -> (AppState, care_gateway::GatewayConfig) {
    let config = common::gateway_config("http://127.0.0.1:1");
    let (state, _rx) = AppState::build(&config, Arc::new(MemoryStore::new())).unwrap();
    (state, config)
}

fn admin(state: AppState) -> Router {
    admin_router(
        state,
        &AdminConfig {
            enabled: true,
            api_key: API_KEY.into(),
            bind_address: "127.0.0.1:0".into(),
        },
    )
}

fn request(method: Method, uri: &str, key: Option<&str>, body: Body) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(key) = key {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {key}"));
    }
    builder.body(body).unwrap()
}

async fn json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_admin_requires_key() {
    let (state, _) = state();
    let app = admin(state);

    let res = app
        .clone()
        .oneshot(request(Method::GET, "/admin/status", None, Body::empty()))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = app
        .oneshot(request(Method::GET, "/admin/status", Some("wrong-key-value"), Body::empty()))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_status_lists_routes() {
    let (state, _) = state();
    let res = admin(state)
        .oneshot(request(Method::GET, "/admin/status", Some(API_KEY), Body::empty()))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body = json(res).await;
    assert_eq!(body["status"], "operational");
    assert_eq!(body["backends"], 1);
    let prefixes: Vec<&str> = body["routes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["prefix"].as_str().unwrap())
        .collect();
    assert!(prefixes.contains(&"/chat"));
    assert!(prefixes.contains(&"/records"));
}

#[tokio::test]
async fn test_issued_token_is_accepted_by_gateway() {
    let (state, config) = state();

    let res = admin(state.clone())
        .oneshot(request(
            Method::POST,
            "/admin/tokens",
            Some(API_KEY),
            Body::from(r#"{"user_id":"nurse-3"}"#),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body = json(res).await;
    assert_eq!(body["token_type"], "Bearer");
    let token = body["access_token"].as_str().unwrap().to_string();
    assert_eq!(state.auth.validate(&token).unwrap().sub, "nurse-3");

    // PHI from an authenticated caller passes the gate; the backend is down, so 502.
    let res = build_router(&config, state.clone())
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/chat")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::from(r#"{"message":"my mrn: 88421"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);

    let audit = admin(state)
        .oneshot(request(Method::GET, "/admin/audit?limit=5", Some(API_KEY), Body::empty()))
        .await
        .unwrap();
    let entries = json(audit).await;
    assert_eq!(entries[0]["user_id"], "nurse-3");
    assert_eq!(entries[0]["compliance_status"], "monitored");
    assert_eq!(entries[0]["access_approved"], true);
}

#[tokio::test]
async fn test_empty_user_id_rejected() {
    let (state, _) = state();
    let res = admin(state)
        .oneshot(request(
            Method::POST,
            "/admin/tokens",
            Some(API_KEY),
            Body::from(r#"{"user_id":"  "}"#),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_audit_stats_counts_denials() {
    let (state, config) = state();
    let res = build_router(&config, state.clone())
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/chat")
                .body(Body::from(r#"{"message":"SSN 123-45-6789"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = admin(state)
        .oneshot(request(Method::GET, "/admin/audit/stats", Some(API_KEY), Body::empty()))
        .await
        .unwrap();
    let stats = json(res).await;
    assert_eq!(stats["total_recorded"], 1);
    assert_eq!(stats["access_denied"], 1);
    assert_eq!(stats["by_risk_level"]["high"], 1);
}
