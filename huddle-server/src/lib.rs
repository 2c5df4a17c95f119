mod room;
mod server_config;
mod signaling;

pub use room::*;
pub use server_config::*;
pub use signaling::*;

use anyhow::Context;
use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tracing::info;

pub fn app(service: SignalingService) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(service)
}

/// Serve on an already bound listener until the process is stopped.
pub async fn serve(listener: TcpListener, service: SignalingService) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    info!("Coordination server listening on ws://{}/ws", addr);

    axum::serve(listener, app(service))
        .await
        .context("coordination server stopped")
}

pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    serve(listener, SignalingService::new()).await
}
