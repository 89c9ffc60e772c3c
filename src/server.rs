use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

use crate::context::AppContext;
use crate::session::{self, ChatRequest, ChatResponse, SessionError};

pub const CHAT_PATH: &str = "/api/chat";
pub const HEALTH_PATH: &str = "/health";

pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route(CHAT_PATH, post(chat).fallback(method_not_allowed))
        .route(HEALTH_PATH, get(health))
        .with_state(ctx)
}

/// Serves until the shutdown token fires, then drains in-flight requests.
pub async fn serve(ctx: AppContext, listen: &str) -> Result<()> {
    let shutdown = ctx.shutdown.clone();
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("bind {listen}"))?;
    info!(addr = %listener.local_addr()?, "relay listening");

    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("http server")?;
    info!("relay stopped");
    Ok(())
}

async fn chat(
    State(ctx): State<AppContext>,
    body: Bytes,
) -> Result<Json<ChatResponse>, SessionError> {
    let request_id = Uuid::new_v4();
    async move {
        let req: ChatRequest = serde_json::from_slice(&body)
            .map_err(|e| SessionError::InvalidRequest(format!("Malformed request body: {e}")))?;
        info!(action = %req.action, thread_id = ?req.thread_id, "chat request");
        let resp = session::handle(&ctx, req).await?;
        Ok(Json(resp))
    }
    .instrument(info_span!("chat", %request_id))
    .await
}

async fn method_not_allowed() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({ "error": "Method Not Allowed" })),
    )
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
