use axum::{
    extract::Extension,
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use tracing;

use parley_core::models::CallStatus;

use crate::auth::AuthenticatedUser;
use crate::state::ApiState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateCallRequest {
    pub receiver_id: i64,
}

pub async fn initiate_call(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(req): Json<InitiateCallRequest>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let call_id = state
        .store
        .create_call(user.id, req.receiver_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create call record: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(serde_json::json!({ "callId": call_id })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCallStatusRequest {
    pub call_id: i64,
    pub status: CallStatus,
}

pub async fn update_call_status(
    Extension(state): Extension<ApiState>,
    Json(req): Json<UpdateCallStatusRequest>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    state
        .store
        .update_call_status(req.call_id, req.status)
        .await
        .map_err(|e| {
            tracing::error!("Failed to update call status: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(serde_json::json!({ "success": true })))
}

pub async fn call_history(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let history = state.store.call_history(user.id).await.map_err(|e| {
        tracing::error!("Failed to load call history: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(serde_json::json!(history)))
}
