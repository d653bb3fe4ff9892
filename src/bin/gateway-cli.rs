use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Service registry CLI for the task gateway", long_about = None)]
struct Cli {
    /// Control-plane base URL.
    #[arg(short, long, env = "GATEWAY_ADMIN_URL", default_value = "http://localhost:8081")]
    url: String,

    /// Bearer token, when the control plane requires one.
    #[arg(short, long, env = "GATEWAY_ADMIN_KEY")]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register (or refresh) a service instance
    Register {
        name: String,
        host: String,
        port: u16,
        /// Health check path on the instance
        #[arg(long, default_value = "/health")]
        health_check: String,
        /// Metadata as a JSON object
        #[arg(long)]
        metadata: Option<String>,
    },
    /// List instances of a service
    Discover {
        name: String,
        /// Only healthy instances
        #[arg(long)]
        healthy: bool,
    },
    /// Remove a service instance
    Deregister { name: String, host: String, port: u16 },
    /// Probe every instance of a service now
    Check { name: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if let Some(key) = &cli.key {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", key))?);
    }
    let endpoint = format!("{}/registry/services", cli.url.trim_end_matches('/'));

    let res = match cli.command {
        Commands::Register {
            name,
            host,
            port,
            health_check,
            metadata,
        } => {
            let metadata: Value = match metadata {
                Some(raw) => serde_json::from_str(&raw)?,
                None => json!({}),
            };
            client
                .post(&endpoint)
                .headers(headers)
                .json(&json!({
                    "name": name,
                    "host": host,
                    "port": port,
                    "health_check": health_check,
                    "metadata": metadata,
                }))
                .send()
                .await?
        }
        Commands::Discover { name, healthy } => {
            client
                .get(&endpoint)
                .headers(headers)
                .query(&[("name", name), ("healthy", healthy.to_string())])
                .send()
                .await?
        }
        Commands::Deregister { name, host, port } => {
            client
                .delete(&endpoint)
                .headers(headers)
                .query(&[("name", name), ("host", host), ("port", port.to_string())])
                .send()
                .await?
        }
        Commands::Check { name } => {
            client
                .post(format!("{}/check", endpoint))
                .headers(headers)
                .query(&[("name", name)])
                .send()
                .await?
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    let pretty = serde_json::from_str::<Value>(&text)
        .and_then(|v| serde_json::to_string_pretty(&v))
        .unwrap_or(text);

    if status.is_success() {
        println!("{}", pretty);
        Ok(())
    } else {
        eprintln!("Error: control plane returned status {}", status);
        eprintln!("{}", pretty);
        std::process::exit(1);
    }
}
