use axum::{
    extract::Request,
    http::{header::AUTHORIZATION, StatusCode},
    response::Response,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing;

use crate::state::ApiState;

/// JWT claims: the session identity carried by every authenticated request
/// and socket handshake.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub id: i64,
    pub phone_number: String,
    pub exp: usize,
}

/// Authenticated user information, inserted into request extensions by the
/// middleware.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: i64,
    pub phone_number: String,
}

fn extract_token(auth_header: Option<&str>) -> Option<String> {
    auth_header?
        .strip_prefix("Bearer ")
        .map(|s| s.trim().to_string())
}

pub fn generate_token(
    user_id: i64,
    phone_number: &str,
    secret: &str,
    expires_in_days: u64,
) -> Result<String, StatusCode> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .as_secs() as usize;

    let claims = Claims {
        id: user_id,
        phone_number: phone_number.to_string(),
        exp: now + (expires_in_days * 24 * 60 * 60) as usize,
    };

    let encoding_key = EncodingKey::from_secret(secret.as_ref());

    encode(&Header::default(), &claims, &encoding_key).map_err(|e| {
        tracing::error!("Failed to generate JWT token: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, StatusCode> {
    let decoding_key = DecodingKey::from_secret(secret.as_ref());
    let validation = Validation::default();

    match decode::<Claims>(token, &decoding_key, &validation) {
        Ok(token_data) => Ok(token_data.claims),
        Err(e) => {
            tracing::debug!("JWT verification failed: {}", e);
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

/// Axum middleware for JWT authentication.
pub async fn auth_middleware(
    mut req: Request,
    next: axum::middleware::Next,
) -> Result<Response, StatusCode> {
    // OTP login, the health probe, and the WebSocket handshake authenticate
    // on their own.
    let path = req.uri().path();
    if path == "/health"
        || path.starts_with("/ws")
        || path == "/api/auth/send-otp"
        || path == "/api/auth/verify-otp"
    {
        return Ok(next.run(req).await);
    }

    let auth_header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match extract_token(auth_header) {
        Some(t) => t,
        None => {
            tracing::debug!("Missing Authorization header");
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    let state = req
        .extensions()
        .get::<ApiState>()
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;

    let claims = verify_token(&token, &state.ctx.config.auth.jwt_secret)?;

    req.extensions_mut().insert(AuthenticatedUser {
        id: claims.id,
        phone_number: claims.phone_number,
    });

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn token_round_trip() {
        let token = generate_token(7, "+15550001111", SECRET, 7).unwrap();
        let claims = verify_token(&token, SECRET).unwrap();
        assert_eq!(claims.id, 7);
        assert_eq!(claims.phone_number, "+15550001111");
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = generate_token(7, "+15550001111", SECRET, 7).unwrap();
        assert_eq!(
            verify_token(&token, "other-secret").unwrap_err(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn expired_token_is_rejected() {
        // Encode with an exp far enough in the past to clear validation
        // leeway.
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as usize;
        let claims = Claims {
            id: 7,
            phone_number: "+15550001111".to_string(),
            exp: now - 3600,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_ref()),
        )
        .unwrap();

        assert_eq!(
            verify_token(&token, SECRET).unwrap_err(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn bearer_prefix_is_required() {
        assert_eq!(extract_token(Some("Bearer abc")), Some("abc".to_string()));
        assert_eq!(extract_token(Some("abc")), None);
        assert_eq!(extract_token(None), None);
    }
}
