//! HTTP endpoints for broadcasts and the bot webhook.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use color_eyre::{eyre::eyre, Result};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::handlers::{self, BroadcastError, BroadcastReport, BroadcastRequest, Update};
use super::telegram::MessageSender;
use crate::config::MessagingConfig;

#[derive(Clone)]
pub struct AppState {
  pub sender: Arc<dyn MessageSender>,
  pub config: Arc<MessagingConfig>,
}

/// Errors returned to HTTP clients as `{"error": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
  #[error(transparent)]
  Broadcast(#[from] BroadcastError),
  #[error("Invalid JSON body: {0}")]
  InvalidBody(String),
  #[error("Method not allowed")]
  MethodNotAllowed,
}

impl HandlerError {
  fn status(&self) -> StatusCode {
    match self {
      Self::Broadcast(BroadcastError::MissingFields) | Self::InvalidBody(_) => StatusCode::BAD_REQUEST,
      Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
    }
  }
}

impl IntoResponse for HandlerError {
  fn into_response(self) -> Response {
    (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
  }
}

pub fn router(state: AppState) -> Router {
  Router::new()
    .route(
      "/api/send-notification",
      get(broadcast_status)
        .post(broadcast)
        .fallback(method_not_allowed),
    )
    .route(
      "/api/telegram-webhook",
      get(webhook_status).post(webhook).fallback(acknowledge),
    )
    .with_state(state)
}

/// Serve the messaging endpoints until the process is stopped.
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
  let listener = tokio::net::TcpListener::bind(addr)
    .await
    .map_err(|e| eyre!("Failed to bind {}: {}", addr, e))?;
  info!(%addr, "messaging server listening");

  axum::serve(listener, router(state))
    .await
    .map_err(|e| eyre!("Server error: {}", e))
}

async fn broadcast_status() -> Json<Value> {
  Json(json!({ "ok": true, "message": "Send Notification API is active" }))
}

async fn broadcast(
  State(state): State<AppState>,
  body: Bytes,
) -> Result<Json<BroadcastReport>, HandlerError> {
  let value: Value =
    serde_json::from_slice(&body).map_err(|e| HandlerError::InvalidBody(e.to_string()))?;
  let request: BroadcastRequest =
    serde_json::from_value(value).map_err(|_| BroadcastError::MissingFields)?;

  let report = handlers::broadcast(state.sender.as_ref(), &state.config, request).await?;
  Ok(Json(report))
}

async fn method_not_allowed() -> HandlerError {
  HandlerError::MethodNotAllowed
}

async fn webhook_status() -> Json<Value> {
  Json(json!({ "ok": true, "message": "Telegram Webhook is active" }))
}

async fn webhook(State(state): State<AppState>, body: Bytes) -> Json<Value> {
  match serde_json::from_slice::<Update>(&body) {
    Ok(update) => {
      debug!(?update, "received update");
      handlers::handle_update(state.sender.as_ref(), &state.config, &update).await;
    }
    Err(e) => warn!(error = %e, "ignoring malformed update"),
  }
  Json(json!({ "ok": true }))
}

async fn acknowledge() -> Json<Value> {
  Json(json!({ "ok": true }))
}
