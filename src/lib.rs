pub mod app_config;
pub mod chat_service;
pub mod client;
pub mod error;
pub mod gateway;
pub mod http;
pub mod models;
pub mod realtime;
pub mod responder;
pub mod session;
pub mod store;

pub use app_config::AppConfig;
pub use chat_service::{ChatService, SentMessage};
pub use client::ChatApiClient;
pub use error::{ChatError, ChatResult, GenerationError};
pub use gateway::{MessageStoreGateway, RecordedMessage};
pub use http::{router, AppState};
pub use models::{Conversation, Message, MessageRole};
pub use realtime::{BroadcastDispatcher, RoomRegistry};
pub use responder::{AIService, ReplySettings, Responder};
pub use session::ConversationSession;
pub use store::{ChatStore, MemoryStore, TursoStore};
