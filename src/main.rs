use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

/// Bridge a Wallbox charger's internal state to MQTT with Home Assistant discovery
#[derive(Parser, Debug)]
#[command(name = "wallbox-bridge", version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(default_value = "bridge.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wallbox_bridge=info".into()),
        )
        .init();

    let args = Args::parse();

    info!("Wallbox bridge starting...");

    let config = wallbox_bridge::config::load_config(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config))?;
    info!(
        "Configuration loaded (broker {}:{}, polling every {}s)",
        config.mqtt.host, config.mqtt.port, config.settings.polling_interval_seconds
    );

    wallbox_bridge::bridge::launch(config).await
}
