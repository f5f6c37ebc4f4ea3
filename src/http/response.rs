//! Backend response → client response.
//!
//! # Responsibilities
//! - Pass the backend status through, including 5xx
//! - Strip hop-by-hop and framing headers (axum re-frames the body)
//! - Never let a backend set gateway trust or compliance headers

use axum::{
    body::Body,
    http::{header, HeaderMap},
    response::Response,
};

use crate::dispatch::BackendResponse;

const STRIPPED: [&str; 5] = [
    "connection",
    "keep-alive",
    "transfer-encoding",
    "upgrade",
    "content-length",
];

/// Compliance verdicts are set by the gateway alone.
const COMPLIANCE_PREFIX: &str = "x-hipaa-";

fn copy_headers(from: &HeaderMap, to: &mut HeaderMap) {
    for (name, value) in from.iter() {
        let name_str = name.as_str();
        if STRIPPED.contains(&name_str) || name_str.starts_with(COMPLIANCE_PREFIX) {
            continue;
        }
        to.append(name.clone(), value.clone());
    }
}

pub fn into_client_response(backend: BackendResponse) -> Response {
    let mut response = Response::new(Body::from(backend.body));
    *response.status_mut() = backend.status;
    copy_headers(&backend.headers, response.headers_mut());
    if !response.headers().contains_key(header::CONTENT_TYPE) {
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
    }
    response
}
