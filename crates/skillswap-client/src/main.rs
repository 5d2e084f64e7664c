//! Skillswap terminal client - entry point.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Skillswap realtime terminal client
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via SKILLSWAP_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize TLS crypto provider (must be before any connections)
    skillswap_realtime::init_crypto();

    let args = Args::parse();

    skillswap_telemetry::init_logging()?;

    info!("Starting skillswap client v{}", env!("CARGO_PKG_VERSION"));

    // Config path: CLI arg > SKILLSWAP_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("SKILLSWAP_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");
    let config = skillswap_client::AppConfig::load(&config_path)?;
    info!(
        user_id = config.user_id,
        transport = ?config.realtime.transport,
        "Configuration loaded"
    );

    let app = skillswap_client::Application::new(config);
    app.run().await?;

    Ok(())
}
