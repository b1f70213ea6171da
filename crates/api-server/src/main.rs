//! API server for the credit ledger
//!
//! Serves organization balances, credit consumption and member limits over
//! REST on `LEDGER_BIND_ADDR` (default port 8081).

mod auth;
mod config;
mod routes;
mod state;

use anyhow::Context;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ServerConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "ledger_server=debug,ledger_core=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env().context("Failed to read server configuration")?;
    if config.uses_default_secret() {
        tracing::warn!("LEDGER_JWT_SECRET is not set; using the development secret");
    }
    if config.allow_dev_tokens {
        tracing::warn!("Development token minting is enabled");
    }
    tracing::info!("Using data directory: {:?}", config.data_dir);

    let bind_addr = config.bind_addr;
    let app_state = AppState::new(config)
        .await
        .context("Failed to initialize application state")?;

    let app = routes::router()
        .with_state(app_state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    tracing::info!("REST API listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
}
