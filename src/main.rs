//! care-gateway
//!
//! Edge policy layer for the care platform: authenticates, rate-limits and
//! audits inbound requests, then dispatches them to named backend services
//! behind per-backend circuit breakers.
//!
//! ```text
//!     Client ──▶ request id / trace ──▶ identity ──▶ session ──▶ rate limit
//!                                                                    │
//!                                       [require auth] ◀─────────────┘
//!                                              │
//!                                        [PHI audit] ──▶ audit trail ──▶ sink workers
//!                                              │
//!     Client ◀── response ◀── Dispatcher ◀─────┘
//!                               │  circuit breaker per backend
//!                               ▼
//!                          backend services ◀── health monitor
//! ```

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use care_gateway::config::{self, GatewayConfig};
use care_gateway::lifecycle::startup;
use care_gateway::observability::{logging, metrics};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "care-gateway", version, about = "Healthcare API gateway")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured log format.
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

fn load(cli: &Cli) -> Result<GatewayConfig, config::ConfigError> {
    match &cli.config {
        Some(path) => config::load_config(path),
        None => config::loader::finalize(GatewayConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match load(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("care-gateway: {e}");
            std::process::exit(2);
        }
    };
    if let Some(format) = cli.log_format {
        config.observability.json_logs = matches!(format, LogFormat::Json);
    }

    logging::init_logging(&config.observability);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        backends = config.backends.len(),
        routes = config.routes.len(),
        store = ?config.store.backend,
        "care-gateway starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    startup::run(config).await?;
    tracing::info!("Shutdown complete");
    Ok(())
}
