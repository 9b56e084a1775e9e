//! PCAN Bridge Daemon
//!
//! Serves the CAN adapter HTTP API and guarantees the channel is released
//! when the process exits.

use std::sync::Arc;

use anyhow::Result;
use pcan_bridge::device::LoopbackDevice;
use pcan_bridge::server::{create_router, AppState};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

const DEFAULT_ADDR: &str = "0.0.0.0:5001";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .compact()
        .init();

    println!("PCAN Bridge v{}", env!("CARGO_PKG_VERSION"));
    println!();

    // No hardware driver is linked in; the loopback channel stands in so
    // the API is fully exercisable. A PCAN-Basic backend plugs in here.
    let device = LoopbackDevice::new();
    let state = Arc::new(AppState::new(Box::new(device)));

    let addr = std::env::var("PCAN_BRIDGE_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("HTTP server listening on {}", addr);

    let app = create_router(state.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Best-effort hardware release; the manager's Drop covers the paths
    // that never reach this point.
    let mut channel = state.channel.lock().await;
    if channel.is_ready() {
        info!("Releasing CAN channel on exit...");
        if let Err(err) = channel.release() {
            warn!("release on exit failed: {err}");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
}
