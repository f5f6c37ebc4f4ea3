use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Management CLI for the care gateway admin API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:8081")]
    url: String,

    #[arg(short, long, env = "GATEWAY_ADMIN_API_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Gateway version, uptime and routes
    Status,
    /// Backend health and circuit breaker state
    Backends,
    /// Most recent PHI audit entries
    Audit {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Audit trail statistics
    Stats,
    /// Issue an access token for a user
    IssueToken {
        user_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", cli.key))?);

    let request = match cli.command {
        Commands::Status => client.get(format!("{base}/admin/status")),
        Commands::Backends => client.get(format!("{base}/admin/backends")),
        Commands::Audit { limit } => client
            .get(format!("{base}/admin/audit"))
            .query(&[("limit", limit)]),
        Commands::Stats => client.get(format!("{base}/admin/audit/stats")),
        Commands::IssueToken { user_id } => client
            .post(format!("{base}/admin/tokens"))
            .json(&json!({ "user_id": user_id })),
    };

    let response = request.headers(headers).send().await?;
    print_response(response).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if status.is_success() {
        let body: Value = res.json().await?;
        println!("{}", serde_json::to_string_pretty(&body)?);
        Ok(())
    } else {
        let text = res.text().await.unwrap_or_default();
        eprintln!("Error: {status} {text}");
        std::process::exit(1);
    }
}
