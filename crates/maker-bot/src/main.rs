//! Market-making engine entry point.

use anyhow::Result;
use clap::Parser;
use maker_bot::{AppConfig, Application, FixedSpreadQuoter};
use maker_gateway::HttpTransport;
use tracing::info;

/// Market-making trading engine.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via MAKER_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    maker_bot::logging::init_logging();
    info!("Starting maker-bot v{}", env!("CARGO_PKG_VERSION"));

    let config_path = args
        .config
        .or_else(|| std::env::var("MAKER_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());
    info!(config_path = %config_path, "Loading configuration");

    let config = AppConfig::load(&config_path)?;
    info!(
        symbol = %config.symbol,
        mode = ?config.mode,
        testnet = config.testnet,
        "Configuration loaded"
    );

    let api_key = std::env::var("MAKER_API_KEY").unwrap_or_default();
    let transport = HttpTransport::new(config.rest_url.clone(), api_key)?;
    let strategy = Box::new(FixedSpreadQuoter::from_config(&config.strategy));

    let mut app = Application::new(config, transport, strategy);
    app.initialize().await?;
    app.run().await?;

    Ok(())
}
