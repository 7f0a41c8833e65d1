use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;
use std::io::Write;
use std::path::PathBuf;

use service_sentinel::fallback::CapabilityRequest;

#[derive(Parser)]
#[command(name = "sentinel-cli")]
#[command(about = "Management CLI for the service sentinel", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "SENTINEL_API_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check sentinel system status
    Status,
    /// List registered services and their last status
    Services,
    /// Inspect one service
    Service { name: String },
    /// Clear a service's failure counter and backoff
    Reset { name: String },
    /// Start monitoring a registered service
    Start { name: String },
    /// Stop monitoring a service
    Stop { name: String },
    /// Show provider cooldown diagnostics
    Providers,
    /// Follow status changes as they happen
    Events,
    /// Run the provider fallback chain
    Execute {
        input: String,
        /// Extra parameters as key=value
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
        /// Stream the payload instead of fetching it at once
        #[arg(long)]
        stream: bool,
        /// Write the payload here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let res = match cli.command {
        Commands::Status => client.get(format!("{}/admin/status", base)),
        Commands::Services => client.get(format!("{}/admin/services", base)),
        Commands::Service { name } => client.get(format!("{}/admin/services/{}", base, name)),
        Commands::Reset { name } => client.post(format!("{}/admin/services/{}/reset", base, name)),
        Commands::Start { name } => client.post(format!("{}/admin/services/{}/start", base, name)),
        Commands::Stop { name } => client.post(format!("{}/admin/services/{}/stop", base, name)),
        Commands::Providers => client.get(format!("{}/admin/providers", base)),
        Commands::Events => {
            let res = client
                .get(format!("{}/admin/events", base))
                .headers(headers)
                .send()
                .await?;
            return follow_events(res).await;
        }
        Commands::Execute {
            input,
            params,
            stream,
            output,
        } => {
            let mut request = CapabilityRequest::new(input);
            for (k, v) in params {
                request = request.with_param(k, v);
            }
            let path = if stream { "capability/stream" } else { "capability" };
            let res = client
                .post(format!("{}/{}", base, path))
                .headers(headers)
                .json(&request)
                .send()
                .await?;
            return write_payload(res, output).await;
        }
    }
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

    let body = res.bytes().await?;
    if body.is_empty() {
        println!("{}", status);
        return Ok(());
    }
    let json: Value = serde_json::from_slice(&body)?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

async fn follow_events(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    if !res.status().is_success() {
        return print_response(res).await;
    }

    let mut body = res.bytes_stream();
    let mut stdout = std::io::stdout();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        let text = String::from_utf8_lossy(&chunk);
        for line in text.lines() {
            if let Some(data) = line.strip_prefix("data:") {
                writeln!(stdout, "{}", data.trim())?;
            }
        }
        stdout.flush()?;
    }
    Ok(())
}

async fn write_payload(
    res: reqwest::Response,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    if !res.status().is_success() {
        return print_response(res).await;
    }

    let payload = res.bytes().await?;
    if payload.is_empty() {
        eprintln!("All providers failed; empty payload");
        return Ok(());
    }
    match output {
        Some(path) => {
            std::fs::write(&path, &payload)?;
            eprintln!("Wrote {} bytes to {}", payload.len(), path.display());
        }
        None => std::io::stdout().write_all(&payload)?,
    }
    Ok(())
}
