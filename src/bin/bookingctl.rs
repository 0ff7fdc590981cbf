use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "bookingctl")]
#[command(about = "Management CLI for the booking server", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Admin bearer key (`admin.api_key` on the server)
    #[arg(short, long, env = "BOOKING_ADMIN_KEY")]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version, shutdown phase, tasks, pool stats and degraded integrations
    Status,
    /// Check readiness; exits non-zero when the server is not ready
    Ready,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    match cli.command {
        Commands::Status => {
            let mut headers = HeaderMap::new();
            if let Some(key) = &cli.key {
                headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", key))?);
            }
            let res = client
                .get(format!("{}/admin/status", base))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await
        }
        Commands::Ready => {
            let res = client.get(format!("{}/readyz", base)).send().await?;
            print_response(res).await
        }
    }
}

async fn print_response(res: reqwest::Response) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;

    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) if !text.is_empty() => println!("{}", text),
        Err(_) => {}
    }

    if status.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("Error: server returned status {}", status);
        Ok(ExitCode::FAILURE)
    }
}
