//! Connect Four Game Server
//!
//! Reads configuration from the environment, serves WebSocket players and
//! keeps results in memory.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use connect_four::{GameServer, MemoryResultSink, ServerConfig, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env()?;
    info!("Connect Four Server v{}", VERSION);
    info!(
        "Board {}x{}, bot depth {}, reconnect window {}s",
        config.session.rows,
        config.session.cols,
        config.session.ai_depth,
        config.session.reconnect_timeout.as_secs()
    );

    let sink = Arc::new(MemoryResultSink::new());
    let server = GameServer::new(config, sink);
    let shutdown = server.shutdown_handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown.send(());
        }
    });

    server.run().await?;
    info!("Server stopped");
    Ok(())
}
