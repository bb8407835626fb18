//! Inbound HTTP surface: Telegram webhook, WhatsApp (Twilio) webhook, web chat
//! and health probes.

mod routes;
mod state;

use std::{net::SocketAddr, sync::Arc};

use axum::{
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;

pub use routes::{ChatRequest, ChatResponse};
pub use state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/telegram-webhook", post(routes::telegram_webhook))
        .route("/webhook", post(routes::whatsapp_webhook))
        .route("/api/chat", post(routes::web_chat))
        .route("/health", get(routes::health))
        .route("/ping", get(routes::ping))
        .with_state(state)
}

/// Serve until `cancel` fires, then drain in-flight requests.
pub async fn serve(addr: &str, state: Arc<AppState>, cancel: CancellationToken) -> anyhow::Result<()> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid bind address '{addr}': {e}"))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, mode = %state.mode, "http server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
            tracing::info!("http server shutting down");
        })
        .await?;
    Ok(())
}
