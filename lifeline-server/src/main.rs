use anyhow::{Context, Result};
use axum::{Router, routing::get};
use clap::Parser;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use lifeline_server::{Coordinator, ServerConfig, SignalingService, ws_handler};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::parse();

    let (coordinator_tx, coordinator_rx) = mpsc::channel(256);
    let service = SignalingService::new(coordinator_tx);

    let coordinator = Coordinator::new(coordinator_rx, Arc::new(service.clone()));
    tokio::spawn(coordinator.run());

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .layer(cors)
        .with_state(service);

    let addr = config.addr();
    info!("Signaling server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
