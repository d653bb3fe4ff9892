//! Task Gateway
//!
//! Traffic core in front of computational task executors.
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌──────────────────────────────────────────────────────┐
//!                       │                    TASK GATEWAY                       │
//!                       │                                                      │
//!   Client Request      │  ┌────────────┐   ┌────────┐   ┌──────────────────┐  │
//!   ────────────────────┼─▶│ rate limit │──▶│ tracer │──▶│ validate + route │  │
//!                       │  └─────┬──────┘   └────────┘   └────────┬─────────┘  │
//!                       │        │ 429                            │            │
//!                       │        ▼                                ▼            │
//!                       │  ┌────────────┐               ┌──────────────────┐   │
//!                       │  │   store    │◀──────────────│ service registry │   │
//!                       │  │ memory/redis│              └────────┬─────────┘   │
//!                       │  └────────────┘                        │             │
//!   Client Response     │                                        ▼             │
//!   ◀───────────────────┼─────────────────────────────── upstream forward ─────┼──▶ Executor
//!                       │                                                      │    or default
//!                       │  Control plane: /registry/services   Health monitor  │    backend
//!                       └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use task_gateway::config::{load_config, GatewayConfig};
use task_gateway::lifecycle::signals::spawn_signal_handler;
use task_gateway::observability::{logging, metrics};
use task_gateway::{Gateway, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "task-gateway", version, about = "Rate limiting and task routing gateway")]
struct Args {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "task-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        admin_address = %config.admin.bind_address,
        store = ?config.store.backend,
        rate_limit_strategy = ?config.rate_limit.effective_strategy(config.store.backend),
        selection = ?config.registry.selection,
        "Configuration loaded"
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

    let gateway = Gateway::build(config).await?;

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());
    gateway.run(&shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
