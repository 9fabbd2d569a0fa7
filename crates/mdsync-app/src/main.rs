//! mdsync - real-time market data sync engine - entry point.

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

/// Real-time market data sync engine.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via MDSYNC_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Override the configured instrument as VENUE:PAIR
    #[arg(short, long)]
    instrument: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Must run before any WS connection
    mdsync_ws::init_crypto();

    let args = Args::parse();

    mdsync_telemetry::init_logging()?;

    info!("Starting mdsync v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > MDSYNC_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("MDSYNC_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");
    let mut config = mdsync::AppConfig::from_file(&config_path)?;

    if let Some(instrument) = args.instrument {
        config.override_instrument(&instrument)?;
        config.validate()?;
    }

    info!(
        ws_url = %config.ws_url,
        analytics_url = %config.analytics_url,
        instrument = %config.instrument.key(),
        "Configuration loaded"
    );

    let view = mdsync::MarketView::from_config(&config)?;
    let handle = view.handle();
    let mut task = tokio::spawn(view.run());

    tokio::select! {
        result = &mut task => {
            // Loop ended on its own
            result??;
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    if let Err(e) = handle.shutdown().await {
        error!(?e, "Failed to signal market view");
    }
    task.await??;

    Ok(())
}
