//! HTTP surface: REST routes, the WebSocket upgrade and liveness checks

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::chat_service::ChatService;
use crate::error::{ChatError, ChatResult};
use crate::models::{Conversation, Message};
use crate::realtime::socket::ws_handler;

pub const DEFAULT_ALLOWED_ORIGIN: &str = "http://localhost:3000";

#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
    /// Outbound queue size of each WebSocket connection
    pub channel_capacity: usize,
}

impl AppState {
    pub fn new(chat: Arc<ChatService>, channel_capacity: usize) -> Self {
        Self { chat, channel_capacity }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageRequest {
    #[serde(default)]
    conversation_id: String,
    #[serde(default)]
    role: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToggleAiRequest {
    ai_enabled: Option<bool>,
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ChatResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| ChatError::Validation(e.body_text()))
}

async fn health_check() -> impl IntoResponse {
    "Support relay is running"
}

async fn send_message(
    State(state): State<AppState>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> ChatResult<(StatusCode, Json<Message>)> {
    let req = body(payload)?;
    let sent = state
        .chat
        .send_message(&req.conversation_id, &req.role, &req.message)
        .await?;
    Ok((StatusCode::CREATED, Json(sent.message)))
}

async fn chat_history(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> ChatResult<Json<Vec<Message>>> {
    state.chat.history(&conversation_id).await.map(Json)
}

async fn list_conversations(State(state): State<AppState>) -> ChatResult<Json<Vec<Conversation>>> {
    state.chat.conversations().await.map(Json)
}

async fn toggle_ai(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    payload: Result<Json<ToggleAiRequest>, JsonRejection>,
) -> ChatResult<Json<Conversation>> {
    let enabled = body(payload)?
        .ai_enabled
        .ok_or_else(|| ChatError::Validation("aiEnabled must be a boolean".to_string()))?;
    state.chat.toggle_ai(&conversation_id, enabled).await.map(Json)
}

fn cors(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
}

pub fn router(state: AppState, allowed_origins: &[String]) -> Router {
    let api = Router::new()
        .route("/chat/messages", post(send_message))
        .route("/chat/conversations", get(list_conversations))
        .route("/chat/conversations/{conversation_id}/messages", get(chat_history))
        .route("/chat/conversations/{conversation_id}/toggle-ai", patch(toggle_ai));

    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route("/ws", get(ws_handler))
        .nest("/api", api)
        .layer(cors(allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
