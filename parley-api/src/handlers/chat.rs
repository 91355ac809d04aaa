use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use tracing;

use parley_core::models::MessageKind;
use parley_core::StoreError;

use crate::auth::AuthenticatedUser;
use crate::state::ApiState;

const DEFAULT_PAGE_SIZE: i64 = 30;
const MAX_PAGE_SIZE: i64 = 100;

fn store_status(e: StoreError) -> StatusCode {
    match e {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Forbidden => StatusCode::FORBIDDEN,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub async fn get_conversations(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let conversations = state
        .store
        .conversations_for_user(user.id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list conversations: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(serde_json::json!(conversations)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartConversationRequest {
    pub phone_number: String,
}

pub async fn start_conversation(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(req): Json<StartConversationRequest>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let other = state
        .store
        .user_by_phone(&req.phone_number)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    if other.id == user.id {
        return Err(StatusCode::BAD_REQUEST);
    }

    let conversation_id = state
        .store
        .find_or_create_individual(user.id, other.id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to start conversation: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(serde_json::json!({ "conversationId": conversation_id })))
}

#[derive(Deserialize)]
pub struct MessagePageQuery {
    #[serde(default)]
    pub cursor: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
}

pub async fn get_messages(
    Extension(state): Extension<ApiState>,
    Path(conversation_id): Path<i64>,
    Query(params): Query<MessagePageQuery>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

    let messages = state
        .store
        .message_page(conversation_id, params.cursor, limit)
        .await
        .map_err(|e| {
            tracing::error!("Failed to load messages: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(serde_json::json!(messages)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub conversation_id: i64,
    pub content: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
}

/// HTTP send. For file kinds the client puts the uploaded file's URL in
/// `content`; the coordinator normalizes it into the file reference slot.
pub async fn send_message(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let record = state
        .coordinator
        .send_from_api(user.id, req.conversation_id, req.content, req.kind, None)
        .await
        .map_err(|e| {
            tracing::error!("Failed to send message: {}", e);
            store_status(e)
        })?;

    Ok(Json(serde_json::json!(record)))
}

pub async fn delete_message(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(message_id): Path<i64>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    state
        .coordinator
        .delete_message(user.id, message_id)
        .await
        .map_err(store_status)?;

    Ok(Json(serde_json::json!({ "success": true })))
}

pub async fn delete_conversation(
    Extension(state): Extension<ApiState>,
    Path(conversation_id): Path<i64>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    state
        .coordinator
        .remove_conversation(conversation_id)
        .await
        .map_err(store_status)?;

    Ok(Json(serde_json::json!({ "success": true })))
}

pub async fn clear_conversation_messages(
    Extension(state): Extension<ApiState>,
    Path(conversation_id): Path<i64>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    state
        .coordinator
        .clear_conversation(conversation_id)
        .await
        .map_err(store_status)?;

    Ok(Json(serde_json::json!({ "success": true })))
}
