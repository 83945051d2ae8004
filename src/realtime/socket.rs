//! WebSocket endpoint
//!
//! Each connection gets a bounded outbound queue drained by a writer task.
//! Inbound frames are parsed as [`ClientEvent`]s and handled in order.

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use super::connection::ConnectionHandle;
use super::events::{ClientEvent, ServerEvent, TypingPayload};
use super::rooms::Room;
use crate::http::AppState;

/// Upgrade an HTTP request to a live connection
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (conn, mut outbound) = ConnectionHandle::channel(state.channel_capacity);
    let connection_id = conn.id();

    info!(%connection_id, "WebSocket connected");
    let _ = conn.try_deliver(ServerEvent::Connected {
        connection_id: connection_id.as_uuid(),
    });

    let send_task = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sink.send(WsMessage::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, event = event.name(), "Failed to serialize event"),
            }
        }
    });

    while let Some(frame) = stream.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                debug!(%connection_id, error = %e, "WebSocket read error");
                break;
            }
        };

        match frame {
            WsMessage::Text(text) => match serde_json::from_str::<ClientEvent>(text.as_str()) {
                Ok(event) => handle_client_event(event, &conn, &state).await,
                Err(e) => {
                    warn!(%connection_id, error = %e, "Failed to parse client event");
                    let _ = conn.try_deliver(ServerEvent::Error {
                        message: "Invalid event format".to_string(),
                    });
                }
            },
            WsMessage::Close(_) => break,
            // axum answers pings itself; binary frames are not part of the protocol
            _ => {}
        }
    }

    state.chat.rooms().leave_all(connection_id);
    send_task.abort();
    info!(%connection_id, "WebSocket disconnected");
}

async fn handle_client_event(event: ClientEvent, conn: &ConnectionHandle, state: &AppState) {
    let rooms = state.chat.rooms();

    match event {
        ClientEvent::JoinConversation(target) => {
            rooms.join(conn, Room::conversation(target.into_id()));
        }

        ClientEvent::LeaveConversation(target) => {
            rooms.leave(conn.id(), &Room::conversation(target.into_id()));
        }

        ClientEvent::AdminJoin(_) => {
            rooms.join(conn, Room::Admin);
        }

        ClientEvent::SendMessage {
            conversation_id,
            role,
            message,
        } => {
            let reply = match state.chat.send_message(&conversation_id, &role, &message).await {
                Ok(sent) => ServerEvent::MessageSaved(sent.message),
                Err(e) => ServerEvent::Error {
                    message: e.public_message(),
                },
            };
            let _ = conn.try_deliver(reply);
        }

        ClientEvent::Typing {
            conversation_id,
            is_typing,
            role,
        } => {
            state
                .chat
                .relay_typing(conn.id(), &conversation_id, TypingPayload { is_typing, role });
        }

        ClientEvent::ToggleAi {
            conversation_id,
            ai_enabled,
        } => {
            if let Err(e) = state.chat.toggle_ai(&conversation_id, ai_enabled).await {
                let _ = conn.try_deliver(ServerEvent::Error {
                    message: e.public_message(),
                });
            }
        }

        ClientEvent::Ping(_) => {
            let _ = conn.try_deliver(ServerEvent::Pong);
        }
    }
}
