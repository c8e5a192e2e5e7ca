#![warn(clippy::all)]

mod config;
mod database;
mod monitoring;
mod notifications;
mod orchestrator;
mod pool;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use crate::config::Config;
use crate::orchestrator::Orchestrator;
use crate::pool::{LibsqlManager, LibsqlPool};

/// Uptime monitoring daemon: probes configured endpoints, tracks
/// incidents, and dispatches alerts on state changes.
#[derive(Parser)]
#[command(name = "vigil-service", version, about)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the database path from the configuration
    #[arg(long)]
    database: Option<PathBuf>,

    /// Print the effective configuration and exit
    #[arg(long)]
    show_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    logger::init_tracing();

    let cli = Cli::parse();
    let mut config =
        Config::from_config(cli.config.as_deref()).context("failed to load configuration")?;

    if let Some(path) = cli.database {
        config.database.path = path.to_string_lossy().into_owned();
    }

    if cli.show_config {
        println!("{config}");
        return Ok(());
    }

    info!("Opening database at {}", config.database.path);
    let db = libsql::Builder::new_local(&config.database.path)
        .build()
        .await
        .context("failed to open database")?;

    let pool: LibsqlPool = LibsqlPool::builder(LibsqlManager::new(db))
        .config(deadpool::managed::PoolConfig::default())
        .build()
        .context("failed to build connection pool")?;

    Orchestrator::start(config, pool).await
}
