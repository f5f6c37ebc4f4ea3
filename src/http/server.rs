//! HTTP server setup.
//!
//! # Responsibilities
//! - Build every gateway component from config
//! - Create the axum Router: gateway endpoints plus one route pair per proxy prefix
//! - Wire up middleware (request id, tracing, timeout, body limit, identity, session, limits)
//! - Forward matched requests through the Dispatcher
//! - Run background tasks (health monitor, audit workers) and shut them down
//!
//! # Middleware order (outermost first)
//! ```text
//! SetRequestId → Trace → PropagateRequestId → security headers → Timeout → BodyLimit
//!     → /health, /health/backends
//!     → optional_auth → session → rate_limit
//!     → [require_auth] → [phi_audit] → proxy_handler
//! ```

use axum::{
    body::{to_bytes, Body},
    extract::{FromRef, State},
    http::Request,
    middleware::from_fn_with_state,
    response::Response,
    routing::{any, delete, get},
    Extension, Json, Router,
};
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin;
use crate::compliance::{
    phi_audit_middleware, spawn_audit_workers, AuditQueue, AuditSink, AuditTrail, PhiAuditEntry,
    PhiAuditor, PhiDetector, TracingSink,
};
use crate::config::{AuthMode, GatewayConfig};
use crate::dispatch::{BackendError, BackendReport, Dispatcher};
use crate::error::GatewayError;
use crate::health::{HealthMonitor, HealthRecord, HealthStatus};
use crate::http::request::{client_ip, forward_headers, trace_id, ForwardContext};
use crate::http::response::into_client_response;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::routing::{Route, RouteTable};
use crate::security::auth::{optional_auth, require_auth, AuthContext, AuthGuard};
use crate::security::headers::security_headers;
use crate::security::rate_limit::{rate_limit_middleware, RateLimiter};
use crate::security::session::{invalidate_session, session_middleware, SessionContext, SessionManager};
use crate::store::KvStore;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("invalid PHI pattern: {0}")]
    Detector(#[from] regex::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Shared gateway components, cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub auth: Arc<AuthGuard>,
    pub sessions: Arc<SessionManager>,
    pub limiter: Arc<RateLimiter>,
    pub auditor: Arc<PhiAuditor>,
    pub routes: Arc<RouteTable>,
    pub max_body_size: usize,
    pub started_at: Instant,
}

impl FromRef<AppState> for Arc<SessionManager> {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}

impl AppState {
    /// Build every component. Fails on unusable backend config.
    pub fn build(
        config: &GatewayConfig,
        store: Arc<dyn KvStore>,
    ) -> Result<(Self, mpsc::Receiver<PhiAuditEntry>), ServerError> {
        let dispatcher = Arc::new(Dispatcher::from_config(config)?);
        let (queue, audit_rx) = AuditQueue::channel(config.phi_audit.queue_size);
        let trail = Arc::new(AuditTrail::new(config.phi_audit.capacity, queue));
        let auditor = PhiAuditor::new(
            PhiDetector::new()?,
            trail,
            &config.phi_audit,
            config.listener.max_body_size,
        );

        let state = Self {
            dispatcher,
            auth: Arc::new(AuthGuard::new(&config.auth)),
            sessions: Arc::new(SessionManager::new(store.clone(), &config.session)),
            limiter: Arc::new(RateLimiter::new(store, config.rate_limit.clone())),
            auditor: Arc::new(auditor),
            routes: Arc::new(RouteTable::from_config(&config.routes)),
            max_body_size: config.listener.max_body_size,
            started_at: Instant::now(),
        };
        Ok((state, audit_rx))
    }
}

/// The gateway's public listener plus its background tasks.
pub struct GatewayServer {
    config: GatewayConfig,
    state: AppState,
    audit_rx: Option<mpsc::Receiver<PhiAuditEntry>>,
    audit_sink: Arc<dyn AuditSink>,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, store: Arc<dyn KvStore>) -> Result<Self, ServerError> {
        let (state, audit_rx) = AppState::build(&config, store)?;
        tracing::info!(
            backends = state.dispatcher.backends().len(),
            routes = state.routes.len(),
            "Gateway components initialized"
        );
        Ok(Self {
            config,
            state,
            audit_rx: Some(audit_rx),
            audit_sink: Arc::new(TracingSink),
        })
    }

    /// Replace the default tracing audit sink.
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = sink;
        self
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn router(&self) -> Router {
        build_router(&self.config, self.state.clone())
    }

    /// Serve until `shutdown` fires, then drain background tasks.
    pub async fn run(mut self, listener: TcpListener, shutdown: &Shutdown) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Gateway listening");

        let monitor = HealthMonitor::new(
            self.state.dispatcher.backends().clone(),
            self.state.dispatcher.health().clone(),
            self.config.health_check.clone(),
        );
        let monitor_handle = tokio::spawn(monitor.run(shutdown.subscribe()));

        let audit_handles = match self.audit_rx.take() {
            Some(rx) => spawn_audit_workers(
                self.audit_sink.clone(),
                rx,
                self.config.phi_audit.workers,
                shutdown,
            ),
            None => Vec::new(),
        };

        let admin_handle = if self.config.admin.enabled {
            let admin_listener = TcpListener::bind(&self.config.admin.bind_address).await?;
            tracing::info!(address = %admin_listener.local_addr()?, "Admin API listening");
            let app = admin::admin_router(self.state.clone(), &self.config.admin);
            let mut stop = shutdown.subscribe();
            Some(tokio::spawn(async move {
                let served = axum::serve(admin_listener, app)
                    .with_graceful_shutdown(async move {
                        let _ = stop.recv().await;
                    })
                    .await;
                if let Err(e) = served {
                    tracing::error!(error = %e, "Admin server failed");
                }
            }))
        } else {
            None
        };

        let app = self.router().into_make_service_with_connect_info::<SocketAddr>();
        let mut stop = shutdown.subscribe();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        if let Err(e) = monitor_handle.await {
            tracing::error!(error = %e, "Health monitor task failed");
        }
        if let Some(handle) = admin_handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Admin server task failed");
            }
        }
        for handle in audit_handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Audit worker task failed");
            }
        }

        tracing::info!("Gateway stopped");
        Ok(())
    }
}

/// Build the public router with all middleware layers.
///
/// Gateway health endpoints sit outside identity, session and rate limiting.
#[allow(deprecated)]
pub fn build_router(config: &GatewayConfig, state: AppState) -> Router {
    let gated = Router::new()
        .route("/session", delete(invalidate_session))
        .merge(proxy_routes(&state))
        .fallback(not_found)
        .with_state(state.clone())
        .layer(from_fn_with_state(state.limiter.clone(), rate_limit_middleware))
        .layer(from_fn_with_state(state.sessions.clone(), session_middleware))
        .layer(from_fn_with_state(state.auth.clone(), optional_auth));

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/health/backends", get(backend_health))
        .with_state(state)
        .merge(gated)
        .layer(RequestBodyLimitLayer::new(config.listener.max_body_size))
        .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)));

    for (name, value) in security_headers() {
        app = app.layer(SetResponseHeaderLayer::if_not_present(name, value));
    }

    app.layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// One `prefix` + `prefix/{*rest}` pair per configured route, with its own layers.
fn proxy_routes(state: &AppState) -> Router<AppState> {
    let mut router = Router::new();
    for route in state.routes.routes() {
        let [exact, nested] = route.patterns();
        let mut sub = Router::new()
            .route(&exact, any(proxy_handler))
            .route(&nested, any(proxy_handler));

        if route.phi_audit {
            sub = sub.route_layer(from_fn_with_state(state.auditor.clone(), phi_audit_middleware));
        }
        if route.auth == AuthMode::Required {
            sub = sub.route_layer(from_fn_with_state(state.auth.clone(), require_auth));
        }
        sub = sub.route_layer(Extension(Arc::new(route.clone())));

        tracing::debug!(
            prefix = %route.path_prefix,
            backend = %route.backend,
            auth = ?route.auth,
            phi_audit = route.phi_audit,
            "Registered proxy route"
        );
        router = router.merge(sub);
    }
    router
}

async fn proxy_handler(
    State(state): State<AppState>,
    Extension(route): Extension<Arc<Route>>,
    request: Request<Body>,
) -> Response {
    let start = Instant::now();
    let trace = trace_id(&request);
    let method = request.method().clone();
    let target = route.rewrite(request.uri());
    let ip = client_ip(&request);
    let user_id = request.extensions().get::<AuthContext>().map(|c| c.user_id.clone());
    let session_id = request
        .extensions()
        .get::<SessionContext>()
        .map(|s| s.session_id.clone());

    tracing::debug!(
        trace_id = trace.as_deref().unwrap_or("-"),
        %method,
        backend = %route.backend,
        target = %target,
        "Proxying request"
    );

    let (parts, body) = request.into_parts();
    let response = match to_bytes(body, state.max_body_size).await {
        Ok(bytes) => {
            let headers = forward_headers(
                &parts.headers,
                &ForwardContext {
                    request_id: trace.as_deref(),
                    session_id: session_id.as_deref(),
                    user_id: user_id.as_deref(),
                    client_ip: Some(&ip),
                },
            );
            let body = (!bytes.is_empty()).then_some(bytes);
            match state
                .dispatcher
                .call(&route.backend, method.clone(), &target, body, headers)
                .await
            {
                Ok(backend_response) => into_client_response(backend_response),
                Err(e) => e.into_response_with_trace(trace.as_deref()),
            }
        }
        Err(_) => GatewayError::PayloadTooLarge(state.max_body_size).into_response_with_trace(trace.as_deref()),
    };

    metrics::record_request(method.as_str(), response.status().as_u16(), &route.path_prefix, start);
    response
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    version: &'static str,
    uptime_secs: u64,
    backends: HashMap<String, HealthRecord>,
}

async fn health(State(state): State<AppState>) -> Json<HealthBody> {
    let backends = state.dispatcher.perform_health_check();
    let status = if backends.values().all(|r| r.status == HealthStatus::Healthy) {
        "healthy"
    } else {
        "degraded"
    };
    Json(HealthBody {
        status,
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        backends,
    })
}

async fn backend_health(State(state): State<AppState>) -> Json<Vec<BackendReport>> {
    Json(state.dispatcher.report())
}

async fn not_found(request: Request<Body>) -> Response {
    let trace = trace_id(&request);
    GatewayError::NotFound(request.uri().path().to_string())
        .into_response_with_trace(trace.as_deref())
}
