//! Exchange server binary.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use exchange_server::{Config, Exchange};

/// Simulated securities exchange for backtesting trading clients.
#[derive(Debug, Parser)]
#[command(name = "exchange-server")]
struct Args {
    /// Path to the exchange configuration file.
    #[arg(default_value = "exchange.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::from_file(&args.config)?;
    info!(symbol = %config.symbol_upper(), "starting exchange");

    Exchange::from_config(config)?.run().await
}
