//! Switchyard server.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────────┐
//!                     │                       SWITCHYARD                         │
//!                     │                                                          │
//!   Client Request    │  ┌─────────┐   ┌────────────┐   ┌──────────┐            │
//!   ──────────────────┼─▶│  http   │──▶│ dispatcher │──▶│ routing  │            │
//!                     │  │ server  │   │            │   │ registry │            │
//!                     │  └─────────┘   └─────┬──────┘   └──────────┘            │
//!                     │                      │ authorize → bind                  │
//!                     │                      ▼                                   │
//!                     │               ┌──────────────┐   ┌──────────┐           │
//!                     │               │  execution   │──▶│ handler  │           │
//!                     │               │    pool      │   └────┬─────┘           │
//!                     │               └──────────────┘        │                  │
//!   Client Response   │  ┌─────────┐   ┌──────────────┐       │                  │
//!   ◀─────────────────┼──│  http   │◀──│ negotiate +  │◀──────┘                  │
//!                     │  │ server  │   │ serialize    │                          │
//!                     │  └─────────┘   └──────────────┘                          │
//!                     │                                                          │
//!                     │  ┌────────────────────────────────────────────────────┐ │
//!                     │  │              Cross-Cutting Concerns                 │ │
//!                     │  │  config · health · observability · security ·      │ │
//!                     │  │  admin · lifecycle                                  │ │
//!                     │  └────────────────────────────────────────────────────┘ │
//!                     └──────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use switchyard::config::{load_config, EngineConfig};
use switchyard::observability::logging::init_logging;
use switchyard::Engine;

#[derive(Parser)]
#[command(name = "switchyard")]
#[command(about = "Declarative HTTP request dispatch server", long_about = None)]
struct Args {
    /// TOML configuration file. Watched for changes when given.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => EngineConfig::default(),
    };

    init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "switchyard starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        mode = ?config.execution.mode,
        request_timeout_secs = config.timeouts.request_secs,
        users = config.security.users.len(),
        "Configuration loaded"
    );

    let mut builder = Engine::builder(config);
    if let Some(path) = args.config {
        builder = builder.config_path(path);
    }

    if let Err(e) = builder.build()?.run().await {
        tracing::error!(error = %e, "Server exited with error");
        return Err(e.into());
    }
    Ok(())
}
