//! peerlinkd - peerlink rendezvous server
//!
//! Accepts peer connections, tracks who is online, and relays shared
//! files from its share directory.

use peerlink_server::{Config, Server, ServerConfig};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if PEERLINK_CONFIG is set, then env overrides)
    let config = match Config::load() {
        Ok(c) => {
            if let Ok(path) = std::env::var("PEERLINK_CONFIG") {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            // If a config file was explicitly specified, fail on error
            if std::env::var("PEERLINK_CONFIG").is_ok() {
                tracing::error!("Failed to load config: {}", e);
                return Err(e.into());
            }
            tracing::info!("Using default configuration");
            Config::default()
        }
    };

    tracing::info!("Starting peerlink server");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    tracing::info!("  Share directory: {}", config.storage.share_dir.display());
    tracing::info!("  Max connections: {}", config.network.max_connections);

    // Create the share directory if it does not exist yet
    std::fs::create_dir_all(&config.storage.share_dir)?;

    let server_config = ServerConfig::from_config(&config);
    let server = Arc::new(Server::new(server_config, &config.storage.share_dir)?);

    // Spawn shutdown signal handler
    let shutdown_server = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_server.shutdown();
    });

    // Run server (blocks until shutdown)
    server.run().await?;

    tracing::info!("Server stopped");
    Ok(())
}
