//! Castle Server
//!
//! Runs the authoritative Castle table behind a WebSocket listener.

use std::sync::Arc;
use std::time::Duration;
use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use castle::{
    VERSION,
    game::state::TableConfig,
    network::server::{GameServer, ServerConfig},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Castle Server v{}", VERSION);

    let config = ServerConfig::from_env().context("reading server configuration")?;
    let table_config = TableConfig::from_env();
    info!(
        "Seats: {}-{}, deal attempt budget: {}",
        table_config.min_players, table_config.max_players, table_config.max_deal_attempts
    );

    let server = Arc::new(GameServer::new(config, table_config));
    let running = server.clone();
    let mut handle = tokio::spawn(async move { running.run().await });

    tokio::select! {
        result = &mut handle => {
            // Listener stopped on its own, usually a bind failure
            return result.context("server task panicked")?.context("server stopped");
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for Ctrl-C")?;
            info!("Ctrl-C received, shutting down");
        }
    }

    server.shutdown();
    handle.await.context("server task panicked")??;

    // Let connection tasks flush their shutdown notices
    tokio::time::sleep(Duration::from_millis(250)).await;
    info!("Server stopped");

    Ok(())
}
