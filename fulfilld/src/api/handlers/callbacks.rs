//! Callback zone: posted by node agents when installation finishes or fails.

use axum::extract::State;
use axum::response::Json;
use serde_json::json;

use crate::api::models::provisions::{NodeFailedCallback, NodeReadyCallback};
use crate::errors::Result;
use crate::AppState;

#[tracing::instrument(skip_all)]
pub async fn node_ready(
    State(state): State<AppState>,
    Json(callback): Json<NodeReadyCallback>,
) -> Result<Json<serde_json::Value>> {
    state.hosting.handle_node_ready(&callback).await?;
    Ok(Json(json!({ "status": "ok" })))
}

#[tracing::instrument(skip_all)]
pub async fn node_failed(
    State(state): State<AppState>,
    Json(callback): Json<NodeFailedCallback>,
) -> Result<Json<serde_json::Value>> {
    state.hosting.handle_node_failed(&callback).await?;
    Ok(Json(json!({ "status": "ok" })))
}
