use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension, Query,
    },
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing;

use parley_realtime::{ClientEvent, ConnectionHandle, ServerEvent, Session, SessionUser};

use crate::auth;
use crate::state::ApiState;

#[derive(Deserialize)]
pub struct WsQuery {
    token: String,
}

/// Socket handshake. The bearer token is validated before the upgrade
/// completes; a bad credential rejects the attempt outright and no session
/// state is created.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    Extension(state): Extension<ApiState>,
) -> Response {
    let claims = match auth::verify_token(&query.token, &state.ctx.config.auth.jwt_secret) {
        Ok(claims) => claims,
        Err(status) => return status.into_response(),
    };

    let user = SessionUser {
        id: claims.id,
        phone_number: claims.phone_number,
    };

    ws.on_upgrade(move |socket| handle_socket(socket, user, state))
}

async fn handle_socket(socket: WebSocket, user: SessionUser, state: ApiState) {
    tracing::info!(user_id = user.id, phone_number = %user.phone_number, "WebSocket connection established");

    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    let connection = ConnectionHandle::new(user.clone(), tx);
    let connection_id = connection.id;

    // Writer task: drain the outbound queue onto the socket so broadcasts
    // never wait on this client.
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let frame = match serde_json::to_string(&event) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::error!("Failed to encode server event: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    let online = state.hub.register(connection.clone()).await;
    connection.send(ServerEvent::OnlineUsers(online));

    let session = Session::new(
        connection,
        state.hub.clone(),
        state.coordinator.clone(),
        state.signaling.clone(),
    );

    while let Some(frame) = ws_receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => session.dispatch(event).await,
                Err(e) => {
                    tracing::warn!(user_id = user.id, error = %e, "ignoring malformed client event");
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(user_id = user.id, error = %e, "WebSocket read error");
                break;
            }
        }
    }

    state.hub.unregister(connection_id).await;
    send_task.abort();

    tracing::info!(user_id = user.id, "WebSocket connection closed");
}
