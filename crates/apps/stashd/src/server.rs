//! HTTP query surface and push-notification endpoint

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::prelude::*;
use log::{error, info, warn};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

use stash::{query, MessageId, PageParams, StashStore};

use crate::worker::Job;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn StashStore>,
    pub jobs: UnboundedSender<Job>,
}

/// Handler error mapped to a JSON 500
pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("Request failed: {}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

/// Build the daemon's router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/stats", get(stats))
        .route("/messages", get(messages))
        .route("/messages/:id", get(message_detail))
        .route("/attachments", get(attachments))
        .route("/notifications", post(notifications))
        .with_state(state)
}

/// Bind and serve the HTTP surface until shutdown
pub async fn serve(state: AppState, bind_addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("Listening on http://{}", bind_addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn stats(State(state): State<AppState>) -> Result<Json<query::ArchiveStats>, AppError> {
    let store = state.store.clone();
    let stats =
        tokio::task::spawn_blocking(move || query::archive_stats(store.as_ref())).await??;
    Ok(Json(stats))
}

async fn messages(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> Result<Json<query::MessagePage>, AppError> {
    let store = state.store.clone();
    let page =
        tokio::task::spawn_blocking(move || query::list_messages(store.as_ref(), params)).await??;
    Ok(Json(page))
}

async fn message_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let store = state.store.clone();
    let detail = tokio::task::spawn_blocking(move || {
        query::get_message_detail(store.as_ref(), &MessageId::new(id))
    })
    .await??;

    match detail {
        Some(detail) => Ok(Json(detail).into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "message not found" })),
        )
            .into_response()),
    }
}

async fn attachments(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> Result<Json<query::AttachmentPage>, AppError> {
    let store = state.store.clone();
    let page = tokio::task::spawn_blocking(move || query::list_attachments(store.as_ref(), params))
        .await??;
    Ok(Json(page))
}

/// Pub/Sub push endpoint
///
/// The envelope's payload never gates a re-sync; whatever arrives, every
/// account gets a discovery round.
async fn notifications(State(state): State<AppState>, body: axum::body::Bytes) -> StatusCode {
    if let Some(payload) = decode_push_payload(&body) {
        info!("Push notification: {}", payload);
    }

    if state.jobs.send(Job::SyncAll).is_err() {
        warn!("Sync worker is gone, dropping push trigger");
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::NO_CONTENT
}

/// Best-effort decode of a Pub/Sub push envelope's data field
///
/// Returns the decoded JSON payload for logging, or None when any layer
/// fails to parse.
fn decode_push_payload(body: &[u8]) -> Option<serde_json::Value> {
    let envelope: serde_json::Value = serde_json::from_slice(body).ok()?;
    let data = envelope.get("message")?.get("data")?.as_str()?;
    let bytes = BASE64_STANDARD
        .decode(data)
        .or_else(|_| BASE64_URL_SAFE.decode(data))
        .ok()?;
    serde_json::from_slice(&bytes).ok()
}
