//! Startup orchestration.
//!
//! # Responsibilities
//! - Connect the shared store
//! - Open the audit sink
//! - Build gateway components and bind the listener
//! - Hand over to the server until shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners bind last (traffic only when ready)

use std::sync::Arc;
use tokio::net::TcpListener;

use crate::compliance::{AuditSink, FileSink, SinkError, TracingSink};
use crate::config::GatewayConfig;
use crate::http::server::{GatewayServer, ServerError};
use crate::lifecycle::{signals, Shutdown};
use crate::store::{self, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to connect store: {0}")]
    Store(#[from] StoreError),

    #[error("failed to open audit log: {0}")]
    AuditSink(#[from] SinkError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Server(#[from] ServerError),
}

pub async fn run(config: GatewayConfig) -> Result<(), StartupError> {
    let store = store::connect(&config.store).await?;

    let sink: Arc<dyn AuditSink> = match &config.phi_audit.log_path {
        Some(path) => {
            let sink = FileSink::open(path).await?;
            tracing::info!(path = %sink.path().display(), "Writing PHI audit log");
            Arc::new(sink)
        }
        None => Arc::new(TracingSink),
    };

    let address = config.listener.bind_address.clone();
    let server = GatewayServer::new(config, store)?.with_audit_sink(sink);
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind { address, source })?;

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    server.run(listener, &shutdown).await?;
    Ok(())
}
