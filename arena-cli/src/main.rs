//! Arena CLI
//!
//! Command-line interface for launching games, bots and game type builds
//! and following them until they start or finish.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "arena")]
#[command(about = "Arena game job launcher", long_about = None)]
struct Cli {
    /// Run in local mode (overrides IS_LOCAL)
    #[arg(long)]
    local: bool,

    /// Backend to use (cluster or compose); defaults from --local
    #[arg(long, env = "JOB_BACKEND")]
    backend: Option<String>,

    /// API server URL, e.g. from `kubectl proxy`
    #[arg(long, env = "KUBE_API_URL")]
    kube_api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "arena=info,arena_jobs=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = Config::load(cli.local.then_some(true), cli.backend.as_deref(), cli.kube_api_url)?;
    info!("Selected {} backend", config.settings.backend());

    handle_command(cli.command, &config).await
}
