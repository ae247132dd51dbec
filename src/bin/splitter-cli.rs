use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "splitter-cli")]
#[command(about = "Inspect a running splitter through its admin surface", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8888")]
    url: String,

    /// Admin API key, if the splitter was configured with one.
    #[arg(short, long)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check splitter status
    Status,
    /// List configured upstreams (index 0 is the primary)
    Upstreams,
    /// List retained request lifecycles, newest first
    Requests,
    /// Show one request lifecycle
    Request {
        /// HandleResult id
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if let Some(key) = &cli.key {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", key))?);
    }

    let path = match &cli.command {
        Commands::Status => "/".to_string(),
        Commands::Upstreams => "/upstreams".to_string(),
        Commands::Requests => "/requests".to_string(),
        Commands::Request { id } => format!("/requests/{}", id),
    };

    let base = cli.url.trim_end_matches('/');
    let res = client
        .get(format!("{}{}", base, path))
        .headers(headers)
        .send()
        .await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
