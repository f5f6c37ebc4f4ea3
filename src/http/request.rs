//! Request handling helpers.
//!
//! # Responsibilities
//! - Name the gateway's request headers
//! - Read the request id assigned by the request-id layer
//! - Resolve the client address
//! - Build the header set forwarded to backends
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - `X-User-ID` is a gateway→backend trust header; client copies are dropped
//! - Hop-by-hop headers are never forwarded

use axum::{
    extract::ConnectInfo,
    http::{header, HeaderMap, HeaderName, HeaderValue, Request},
};
use std::net::SocketAddr;

pub const X_REQUEST_ID: &str = "x-request-id";
pub const X_SESSION_ID: &str = "x-session-id";
pub const X_USER_ID: &str = "x-user-id";

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// The request id set by the request-id layer, if any.
pub fn trace_id<B>(request: &Request<B>) -> Option<String> {
    request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Peer address from the connection; "unknown" when served without connect info.
pub fn client_ip<B>(request: &Request<B>) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Identity and tracing headers the gateway sets toward a backend.
#[derive(Debug, Default, Clone)]
pub struct ForwardContext<'a> {
    pub request_id: Option<&'a str>,
    pub session_id: Option<&'a str>,
    pub user_id: Option<&'a str>,
    pub client_ip: Option<&'a str>,
}

/// Copy inbound headers for a backend call, dropping hop-by-hop, host,
/// length and any client-supplied trust headers, then add the gateway's own.
pub fn forward_headers(inbound: &HeaderMap, ctx: &ForwardContext<'_>) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(inbound.len() + 4);
    for (name, value) in inbound.iter() {
        let n = name.as_str();
        if HOP_BY_HOP.contains(&n)
            || name == header::HOST
            || name == header::CONTENT_LENGTH
            || n == X_USER_ID
        {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    let mut set = |name: &'static str, value: Option<&str>| {
        if let Some(v) = value.and_then(|v| HeaderValue::from_str(v).ok()) {
            headers.insert(HeaderName::from_static(name), v);
        }
    };
    set(X_REQUEST_ID, ctx.request_id);
    set(X_SESSION_ID, ctx.session_id);
    set(X_USER_ID, ctx.user_id);
    set("x-forwarded-for", ctx.client_ip);
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_user_id_is_dropped() {
        let mut inbound = HeaderMap::new();
        inbound.insert(X_USER_ID, HeaderValue::from_static("spoofed-admin"));
        inbound.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        inbound.insert(header::HOST, HeaderValue::from_static("gateway"));
        inbound.insert("x-custom", HeaderValue::from_static("kept"));

        let out = forward_headers(&inbound, &ForwardContext::default());
        assert!(out.get(X_USER_ID).is_none());
        assert!(out.get(header::CONNECTION).is_none());
        assert!(out.get(header::HOST).is_none());
        assert_eq!(out["x-custom"], "kept");
    }

    #[test]
    fn test_gateway_identity_is_set() {
        let ctx = ForwardContext {
            request_id: Some("req-1"),
            session_id: Some("sess-1"),
            user_id: Some("user-1"),
            client_ip: Some("10.1.2.3"),
        };
        let out = forward_headers(&HeaderMap::new(), &ctx);
        assert_eq!(out[X_REQUEST_ID], "req-1");
        assert_eq!(out[X_SESSION_ID], "sess-1");
        assert_eq!(out[X_USER_ID], "user-1");
        assert_eq!(out["x-forwarded-for"], "10.1.2.3");
    }

    #[test]
    fn test_client_ip_without_connect_info() {
        let req = Request::builder().body(()).unwrap();
        assert_eq!(client_ip(&req), "unknown");
    }
}
