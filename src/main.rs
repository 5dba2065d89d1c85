//! livechat-gateway server entry point.
//!
//! Starts the Axum HTTP server with the account API and the `/ws` chat
//! endpoint, plus the heartbeat and session reaper tasks.

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use livechat_gateway::api;
use livechat_gateway::app_state::AppState;
use livechat_gateway::config::GatewayConfig;
use livechat_gateway::persistence::{Persistence, PostgresPersistence};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = GatewayConfig::from_env()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("invalid configuration")?;
    tracing::info!(addr = %config.listen_addr, "starting livechat-gateway");

    // Select persistence backend
    let persistence = if config.persistence_enabled {
        let pg = PostgresPersistence::connect(&config)
            .await
            .context("failed to connect to postgres")?;
        Persistence::Postgres(pg)
    } else {
        tracing::warn!("PERSISTENCE_ENABLED is off, accounts and sessions are kept in memory");
        Persistence::in_memory()
    };

    // Build application state
    let listen_addr = config.listen_addr;
    let cleanup_interval = config.session_cleanup_interval();
    let state = AppState::build(config, persistence);

    // Background tasks
    let heartbeat = state.heartbeat_monitor().spawn();
    let reaper = state
        .auth_service
        .sessions()
        .clone()
        .spawn_reaper(cleanup_interval);

    // Start server
    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;
    tracing::info!(addr = %listen_addr, "server listening");

    axum::serve(listener, api::app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited unexpectedly")?;

    heartbeat.abort();
    reaper.abort();
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
