pub mod auth;
pub mod calls;
pub mod chat;

use axum::response::Json;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "parley-api"
    }))
}
