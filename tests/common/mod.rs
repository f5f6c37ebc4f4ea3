//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use care_gateway::config::{
    AuthMode, BackendConfig, GatewayConfig, RouteConfig, WindowConfig,
};
use care_gateway::{AppState, GatewayServer, Shutdown};
use care_gateway::store::MemoryStore;

pub const JWT_SECRET: &str = "integration-secret-integration-secret";

/// A raw-TCP backend that records every request it receives.
#[derive(Clone)]
pub struct MockBackend {
    pub addr: SocketAddr,
    hits: Arc<AtomicU32>,
    requests: Arc<parking_lot::Mutex<Vec<String>>>,
}

impl MockBackend {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> u32 {
        self.hits.load(Ordering::SeqCst)
    }

    /// Raw request heads and bodies, oldest first.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    pub fn last_request(&self) -> Option<String> {
        self.requests.lock().last().cloned()
    }
}

/// Start a backend that answers every request with `status` and `body`.
pub async fn start_mock_backend(status: u16, body: &'static str) -> MockBackend {
    start_programmable_backend(move |_| (status, body.to_string())).await
}

/// Start a backend whose response is computed from the raw request text.
pub async fn start_programmable_backend<F>(f: F) -> MockBackend
where
    F: Fn(&str) -> (u16, String) + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend = MockBackend {
        addr: listener.local_addr().unwrap(),
        hits: Arc::new(AtomicU32::new(0)),
        requests: Arc::new(parking_lot::Mutex::new(Vec::new())),
    };

    let f = Arc::new(f);
    let state = backend.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let f = f.clone();
            let state = state.clone();
            tokio::spawn(async move {
                handle_connection(socket, f.as_ref(), &state).await;
            });
        }
    });
    backend
}

async fn handle_connection<F>(mut socket: TcpStream, f: &F, state: &MockBackend)
where
    F: Fn(&str) -> (u16, String),
{
    let Some(request) = read_request(&mut socket).await else {
        return;
    };
    state.hits.fetch_add(1, Ordering::SeqCst);
    state.requests.lock().push(request.clone());

    let (status, body) = f(&request);
    let response = format!(
        "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        reason(status),
        body.len(),
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

async fn read_request(socket: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(head_end) = find(&buf, b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..head_end]).to_ascii_lowercase();
            let length = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            while buf.len() < head_end + 4 + length {
                let n = socket.read(&mut chunk).await.ok()?;
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            return Some(String::from_utf8_lossy(&buf).into_owned());
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// A backend that accepts connections, reads the request and never replies.
#[derive(Clone)]
pub struct HangingBackend {
    pub addr: SocketAddr,
    accepted: Arc<AtomicU32>,
    closed: Arc<AtomicU32>,
}

impl HangingBackend {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn accepted(&self) -> u32 {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Connections the gateway side has closed.
    pub fn closed(&self) -> u32 {
        self.closed.load(Ordering::SeqCst)
    }

    /// Wait until `n` connections were closed by the peer, or `within` elapses.
    pub async fn wait_closed(&self, n: u32, within: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + within;
        while tokio::time::Instant::now() < deadline {
            if self.closed() >= n {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.closed() >= n
    }
}

pub async fn start_hanging_backend() -> HangingBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend = HangingBackend {
        addr: listener.local_addr().unwrap(),
        accepted: Arc::new(AtomicU32::new(0)),
        closed: Arc::new(AtomicU32::new(0)),
    };

    let state = backend.clone();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            state.accepted.fetch_add(1, Ordering::SeqCst);
            let state = state.clone();
            tokio::spawn(async move {
                let mut chunk = [0u8; 4096];
                // Read until the peer hangs up; never write a response.
                loop {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {}
                    }
                }
                state.closed.fetch_add(1, Ordering::SeqCst);
            });
        }
    });
    backend
}

/// Config with one backend behind `/chat` (PHI audited, optional auth) and
/// `/records` (auth required).
pub fn gateway_config(backend_url: &str) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.auth.jwt_secret = JWT_SECRET.into();
    config.health_check.enabled = false;
    config.rate_limit.windows = vec![WindowConfig { limit: 1000, window_secs: 1 }];
    config.backends.push(BackendConfig {
        name: "chat".into(),
        url: backend_url.into(),
        max_idle_connections: 4,
    });
    config.routes.push(RouteConfig {
        path_prefix: "/chat".into(),
        backend: "chat".into(),
        upstream_prefix: String::new(),
        auth: AuthMode::Optional,
        phi_audit: true,
    });
    config.routes.push(RouteConfig {
        path_prefix: "/records".into(),
        backend: "chat".into(),
        upstream_prefix: "/api/records".into(),
        auth: AuthMode::Required,
        phi_audit: false,
    });
    config
}

pub struct RunningGateway {
    pub addr: SocketAddr,
    pub state: AppState,
    pub shutdown: Shutdown,
    pub handle: tokio::task::JoinHandle<()>,
}

impl RunningGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = tokio::time::timeout(Duration::from_secs(5), self.handle).await;
    }
}

/// Run a gateway on an ephemeral port with an in-memory store.
pub async fn start_gateway(config: GatewayConfig) -> RunningGateway {
    let server = GatewayServer::new(config, Arc::new(MemoryStore::new())).unwrap();
    let state = server.state().clone();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.clone();
    let handle = tokio::spawn(async move {
        server.run(listener, &server_shutdown).await.unwrap();
    });

    RunningGateway {
        addr,
        state,
        shutdown,
        handle,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
