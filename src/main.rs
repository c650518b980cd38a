//! prism - object store console
//!
//! Command-line console for Cloudflare R2 and other S3-compatible
//! object stores.

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod config;
mod error;
mod gateway;
mod listing;
mod store;
mod utils;

use crate::cli::Cli;
use crate::error::Result;

#[tokio::main]
async fn main() {
    init_logging();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("Error: {}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    info!("Starting prism");

    // the config command must still work with a file that fails
    // validation, so it can be inspected and repaired
    let settings = match &cli.command {
        cli::commands::Commands::Config => config::load_settings_no_validation().await?,
        _ => config::Settings::load().await?,
    };

    cli.execute(settings).await?;

    Ok(())
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "prism=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
