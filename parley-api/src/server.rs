use anyhow::Result;
use axum::{
    extract::Extension,
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::env;
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing;

use parley_core::AppContext;

use crate::auth;
use crate::handlers;
use crate::state::ApiState;
use crate::websocket;

pub async fn run(ctx: AppContext) -> Result<()> {
    let port = ctx.config.server.port;
    let state = ApiState::new(ctx);

    // Configure CORS - allow specific origins or all if CORS_ORIGINS not set
    let cors_layer = if let Ok(origins) = env::var("CORS_ORIGINS") {
        let origin_list: Vec<&str> = origins.split(',').map(|s| s.trim()).collect();
        let mut cors = CorsLayer::new();
        for origin in origin_list {
            if let Ok(parsed) = origin.parse::<axum::http::HeaderValue>() {
                cors = cors.allow_origin(parsed);
            }
        }
        cors.allow_methods(Any)
            .allow_headers(Any)
            .allow_credentials(true)
    } else {
        tracing::warn!("CORS_ORIGINS not set, using permissive CORS. Set CORS_ORIGINS for production!");
        CorsLayer::permissive()
    };

    let app = Router::new()
        .route("/health", get(handlers::health))
        .route("/ws", get(websocket::websocket_handler))
        .route("/api/auth/send-otp", post(handlers::auth::send_otp))
        .route("/api/auth/verify-otp", post(handlers::auth::verify_otp))
        .route("/api/auth/me", get(handlers::auth::me))
        .route("/api/auth/profile", put(handlers::auth::update_profile))
        .route(
            "/api/chat/conversations",
            get(handlers::chat::get_conversations).post(handlers::chat::start_conversation),
        )
        .route(
            "/api/chat/conversations/:conversation_id",
            delete(handlers::chat::delete_conversation),
        )
        .route(
            "/api/chat/conversations/:conversation_id/messages",
            delete(handlers::chat::clear_conversation_messages),
        )
        .route("/api/chat/messages", post(handlers::chat::send_message))
        .route(
            "/api/chat/messages/:id",
            get(handlers::chat::get_messages).delete(handlers::chat::delete_message),
        )
        .route("/api/calls/initiate", post(handlers::calls::initiate_call))
        .route("/api/calls/status", post(handlers::calls::update_call_status))
        .route("/api/calls/history", get(handlers::calls::call_history))
        .layer(
            ServiceBuilder::new()
                .layer(Extension(state))
                .layer(middleware::from_fn(auth::auth_middleware))
                .layer(cors_layer),
        );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
