use axum::{
    extract::Extension,
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use tracing;

use parley_core::store::generate_code;

use crate::auth::{generate_token, AuthenticatedUser};
use crate::state::ApiState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOtpRequest {
    pub phone_number: String,
}

/// Issue a one-time code for a phone number. There is no SMS gateway wired
/// up; the code is logged and echoed back for development use.
pub async fn send_otp(
    Extension(state): Extension<ApiState>,
    Json(req): Json<SendOtpRequest>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    if req.phone_number.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let code = generate_code();
    tracing::info!(phone_number = %req.phone_number, "Sending OTP {}", code);

    state
        .store
        .upsert_otp(
            &req.phone_number,
            &code,
            state.ctx.config.auth.otp_ttl_minutes,
        )
        .await
        .map_err(|e| {
            tracing::error!("Failed to store OTP: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(serde_json::json!({
        "message": "OTP sent successfully",
        "devOtp": code,
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpRequest {
    pub phone_number: String,
    pub otp: String,
}

/// Verify a code, creating the user on first login, and hand back a bearer
/// token plus the user record.
pub async fn verify_otp(
    Extension(state): Extension<ApiState>,
    Json(req): Json<VerifyOtpRequest>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let code = req.otp.trim();

    let valid = state
        .store
        .verify_otp(&req.phone_number, code)
        .await
        .map_err(|e| {
            tracing::error!("OTP verification failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    if !valid {
        return Err(StatusCode::BAD_REQUEST);
    }

    let user = match state
        .store
        .user_by_phone(&req.phone_number)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
    {
        Some(user) => user,
        None => {
            tracing::info!(phone_number = %req.phone_number, "Creating new user");
            state
                .store
                .create_user(&req.phone_number)
                .await
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        }
    };

    let token = generate_token(
        user.id,
        &user.phone_number,
        &state.ctx.config.auth.jwt_secret,
        state.ctx.config.auth.token_ttl_days,
    )?;

    Ok(Json(serde_json::json!({
        "token": token,
        "user": user,
    })))
}

pub async fn me(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let user = state
        .store
        .user_by_id(user.id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(serde_json::json!(user)))
}

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    pub username: Option<String>,
}

pub async fn update_profile(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let current = state
        .store
        .user_by_id(user.id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    // Profile pictures are managed elsewhere; keep whatever is on file.
    let updated = state
        .store
        .update_profile(
            user.id,
            req.username.as_deref(),
            current.profile_picture.as_deref(),
        )
        .await
        .map_err(|e| {
            tracing::error!("Failed to update profile: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(serde_json::json!(updated)))
}
