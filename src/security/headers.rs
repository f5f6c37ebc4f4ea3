//! Security response headers.
//!
//! Applied to every gateway response with `SetResponseHeaderLayer::if_not_present`,
//! so a handler that already set one keeps its value.

use axum::http::{header, HeaderName, HeaderValue};

pub fn security_headers() -> [(HeaderName, HeaderValue); 4] {
    [
        (header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
        (header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY")),
        (header::CACHE_CONTROL, HeaderValue::from_static("no-store")),
        (header::REFERRER_POLICY, HeaderValue::from_static("no-referrer")),
    ]
}
