//! PHI gate for content-bearing routes.
//!
//! The body is buffered up to the configured limit, scanned, and an audit
//! entry is recorded for every request, approved or not. Requests carrying
//! PHI without a verified identity are refused with 401.

use axum::{
    body::{to_bytes, Body},
    extract::State,
    http::{HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use crate::compliance::audit::{AuditTrail, ComplianceStatus, PhiAuditEntry};
use crate::compliance::detector::PhiDetector;
use crate::config::PhiAuditConfig;
use crate::error::GatewayError;
use crate::http::request::{client_ip, trace_id};
use crate::observability::metrics;
use crate::security::auth::AuthContext;
use crate::security::session::SessionContext;

/// Who sent what, where. Raw content is passed separately and never stored.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub endpoint: String,
    pub method: String,
    pub client_ip: String,
}

pub struct PhiAuditor {
    detector: PhiDetector,
    trail: Arc<AuditTrail>,
    max_body_size: usize,
    preview_chars: usize,
}

impl PhiAuditor {
    pub fn new(
        detector: PhiDetector,
        trail: Arc<AuditTrail>,
        config: &PhiAuditConfig,
        max_body_size: usize,
    ) -> Self {
        Self {
            detector,
            trail,
            max_body_size,
            preview_chars: config.preview_chars,
        }
    }

    pub fn trail(&self) -> &Arc<AuditTrail> {
        &self.trail
    }

    /// Scan `content`, decide access, and record the audit entry.
    pub fn assess(&self, meta: RequestMeta, content: &[u8]) -> PhiAuditEntry {
        let text = String::from_utf8_lossy(content);
        let detection = self.detector.detect(&text);
        let phi_detected = detection.phi_detected();
        let access_approved = !phi_detected || meta.user_id.is_some();

        let compliance_status = match (access_approved, phi_detected) {
            (false, _) => ComplianceStatus::Violation,
            (true, true) => ComplianceStatus::Monitored,
            (true, false) => ComplianceStatus::Compliant,
        };

        let entry = PhiAuditEntry {
            audit_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            user_id: meta.user_id,
            session_id: meta.session_id,
            endpoint: meta.endpoint,
            method: meta.method,
            client_ip: meta.client_ip,
            phi_detected,
            phi_types: detection.types,
            risk_level: detection.risk_level,
            risk_score: detection.risk_score,
            masked_preview: detection.masked_content.chars().take(self.preview_chars).collect(),
            content_hash: hex::encode(Sha256::digest(content)),
            access_approved,
            compliance_status,
        };

        if phi_detected {
            metrics::record_phi_detection(entry.risk_level.as_str(), access_approved);
            tracing::info!(
                audit_id = %entry.audit_id,
                risk_level = %entry.risk_level,
                approved = access_approved,
                endpoint = %entry.endpoint,
                "PHI detected in request"
            );
        }

        self.trail.record(entry.clone());
        entry
    }
}

fn set_compliance_headers(headers: &mut HeaderMap, entry: &PhiAuditEntry) {
    headers.insert("x-hipaa-compliant", HeaderValue::from_static("true"));
    if let Ok(id) = HeaderValue::from_str(&entry.audit_id) {
        headers.insert("x-hipaa-audit-id", id);
    }
    if entry.phi_detected {
        headers.insert("x-hipaa-phi-detected", HeaderValue::from_static("true"));
        headers.insert("x-hipaa-risk-level", HeaderValue::from_static(entry.risk_level.as_str()));
    }
}

pub async fn phi_audit_middleware(
    State(auditor): State<Arc<PhiAuditor>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let trace = trace_id(&request);
    let meta = RequestMeta {
        user_id: request.extensions().get::<AuthContext>().map(|c| c.user_id.clone()),
        session_id: request
            .extensions()
            .get::<SessionContext>()
            .map(|s| s.session_id.clone()),
        endpoint: request.uri().path().to_string(),
        method: request.method().to_string(),
        client_ip: client_ip(&request),
    };

    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, auditor.max_body_size).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return GatewayError::PayloadTooLarge(auditor.max_body_size)
                .into_response_with_trace(trace.as_deref())
        }
    };

    let entry = auditor.assess(meta, &bytes);
    if !entry.access_approved {
        return GatewayError::PhiAccessDenied {
            audit_id: entry.audit_id,
        }
        .into_response_with_trace(trace.as_deref());
    }

    let mut response = next.run(Request::from_parts(parts, Body::from(bytes))).await;
    set_compliance_headers(response.headers_mut(), &entry);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::detector::RiskLevel;
    use crate::compliance::sink::AuditQueue;

    fn auditor() -> PhiAuditor {
        let (queue, _rx) = AuditQueue::channel(64);
        PhiAuditor::new(
            PhiDetector::new().unwrap(),
            Arc::new(AuditTrail::new(100, queue)),
            &PhiAuditConfig::default(),
            1024,
        )
    }

    fn meta(user: Option<&str>) -> RequestMeta {
        RequestMeta {
            user_id: user.map(str::to_string),
            endpoint: "/chat".into(),
            method: "POST".into(),
            client_ip: "127.0.0.1".into(),
            ..RequestMeta::default()
        }
    }

    #[test]
    fn test_clean_content_is_compliant() {
        let a = auditor();
        let entry = a.assess(meta(None), br#"{"message":"hello"}"#);
        assert!(entry.access_approved);
        assert!(!entry.phi_detected);
        assert_eq!(entry.compliance_status, ComplianceStatus::Compliant);
        assert_eq!(a.trail().len(), 1);
    }

    #[test]
    fn test_anonymous_phi_is_violation() {
        let a = auditor();
        let entry = a.assess(meta(None), br#"{"message":"my mrn: 88421"}"#);
        assert!(!entry.access_approved);
        assert_eq!(entry.compliance_status, ComplianceStatus::Violation);
        assert_eq!(entry.risk_level, RiskLevel::High);
        assert!(!entry.masked_preview.contains("88421"));
        assert_eq!(entry.content_hash.len(), 64);
    }

    #[test]
    fn test_authenticated_phi_is_monitored() {
        let a = auditor();
        let entry = a.assess(meta(Some("user-1")), b"SSN 123-45-6789");
        assert!(entry.access_approved);
        assert_eq!(entry.compliance_status, ComplianceStatus::Monitored);
    }

    #[test]
    fn test_preview_truncated() {
        let (queue, _rx) = AuditQueue::channel(4);
        let a = PhiAuditor::new(
            PhiDetector::new().unwrap(),
            Arc::new(AuditTrail::new(10, queue)),
            &PhiAuditConfig {
                preview_chars: 5,
                ..PhiAuditConfig::default()
            },
            1024,
        );
        let entry = a.assess(meta(None), b"a fairly long message");
        assert_eq!(entry.masked_preview, "a fai");
    }
}
