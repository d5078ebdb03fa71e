//! # beacon-server
//!
//! HTTP server for beacon, the BLE advertising and scanning session manager.
//!
//! This binary provides:
//! - REST API for advertising, scanning, permissions and session state
//! - A server-sent event stream of session changes
//! - OpenAPI documentation via Swagger UI
//! - Structured logging to file and stdout
//!
//! ## Running
//!
//! ```bash
//! # Development
//! cargo run --package beacon-server
//!
//! # With an explicit configuration file
//! BEACON_CONFIG=./beacon.toml ./beacon-server
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::net::SocketAddr;

use anyhow::Context;
use beacon_core::Config;
use beacon_server::api;
use beacon_server::logging;
use beacon_server::state::AppState;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("loading configuration")?;

    let _logging = logging::init(config.server.production)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        production = config.server.production,
        "Starting beacon-server"
    );

    let addr: SocketAddr = format!("{}:{}", config.server.bind_address, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid bind address {}:{}",
                config.server.bind_address, config.server.port
            )
        })?;

    let state = AppState::simulated(config)?;
    info!(
        radio = state.service().radio_kind(),
        peers = state.config().simulation.peers.len(),
        "Radio ready"
    );

    let app = api::create_router(state);
    let listener = TcpListener::bind(addr).await?;

    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
