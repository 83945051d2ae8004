//! Message store gateway
//!
//! The only component that calls the storage collaborator. It validates input
//! before any side effect and maps storage failures to [`ChatError::Storage`].
//! It never broadcasts; fan-out is the caller's job.

use std::sync::Arc;

use tracing::{debug, error};

use crate::error::{ChatError, ChatResult};
use crate::models::{Conversation, Message, MessageRole};
use crate::store::ChatStore;

/// A freshly stored message together with the conversation snapshot that was
/// committed alongside it.
#[derive(Debug, Clone)]
pub struct RecordedMessage {
    pub message: Message,
    pub conversation: Conversation,
}

pub struct MessageStoreGateway {
    store: Arc<dyn ChatStore>,
}

impl MessageStoreGateway {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self { store }
    }

    /// Validate, then upsert the conversation and append the message as one
    /// unit. `role` is the raw wire value so that unknown roles are reported
    /// as validation failures.
    pub async fn record_message(
        &self,
        conversation_id: &str,
        role: &str,
        text: &str,
    ) -> ChatResult<RecordedMessage> {
        let role = MessageRole::parse(role).ok_or_else(|| {
            ChatError::Validation("role must be 'user', 'ai', or 'admin'".to_string())
        })?;
        self.record(conversation_id, role, text).await
    }

    /// Typed variant of [`record_message`](Self::record_message)
    pub async fn record(
        &self,
        conversation_id: &str,
        role: MessageRole,
        text: &str,
    ) -> ChatResult<RecordedMessage> {
        if conversation_id.trim().is_empty() {
            return Err(ChatError::Validation("conversationId is required".to_string()));
        }
        if text.trim().is_empty() {
            return Err(ChatError::Validation("message must not be empty".to_string()));
        }

        let (conversation, message) = self
            .store
            .append_message(conversation_id, role, text)
            .await
            .map_err(|e| {
                error!(conversation_id, role = %role, error = ?e, "Failed to record message");
                ChatError::Storage(e)
            })?;

        debug!(
            conversation_id,
            message_id = %message.id,
            role = %role,
            "Message recorded"
        );

        Ok(RecordedMessage { message, conversation })
    }

    /// Messages of a conversation, oldest first. An empty id yields nothing.
    pub async fn get_history(&self, conversation_id: &str) -> ChatResult<Vec<Message>> {
        if conversation_id.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.store
            .list_messages(conversation_id)
            .await
            .map_err(ChatError::Storage)
    }

    /// All conversations, newest first
    pub async fn list_conversations(&self) -> ChatResult<Vec<Conversation>> {
        self.store.list_conversations().await.map_err(ChatError::Storage)
    }

    pub async fn get_conversation(&self, conversation_id: &str) -> ChatResult<Option<Conversation>> {
        self.store
            .get_conversation(conversation_id)
            .await
            .map_err(ChatError::Storage)
    }

    pub async fn set_ai_enabled(&self, conversation_id: &str, enabled: bool) -> ChatResult<Conversation> {
        self.store
            .set_ai_enabled(conversation_id, enabled)
            .await
            .map_err(ChatError::Storage)?
            .ok_or_else(|| ChatError::NotFound(conversation_id.to_string()))
    }
}
