//! Chat Relay - Entry Point
//!
//! Loads the settings file and runs the relay until Ctrl-C.

use std::env;

use tracing::info;
use tracing_subscriber::EnvFilter;

use chat_relay::ServerConfig;

/// Default settings file
const DEFAULT_SETTINGS: &str = "appsettings.json";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Get settings path from command line or use default
    let path = env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_SETTINGS.to_string());
    let loaded = ServerConfig::load(&path)?;
    let found = loaded.is_some();
    let config = loaded.unwrap_or_default();

    // RUST_LOG wins over the ShowDetailedOutput setting
    let default_filter = if config.verbose {
        "chat_relay=debug"
    } else {
        "chat_relay=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    if !found {
        info!("No settings file at {}, using defaults", path);
    }
    info!(
        "Server name: {}, address: {}, port: {}",
        config.display_name, config.bind_address, config.port
    );
    info!("Press Ctrl-C to shut down the server at any time.");

    chat_relay::start(config).await?;
    Ok(())
}
