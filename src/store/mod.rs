//! Durable storage for conversations and messages.
//!
//! The relay core only talks to storage through [`ChatStore`]. Two backends
//! ship with the crate: an in-process [`MemoryStore`] and the Turso HTTP
//! backed [`TursoStore`].

pub mod memory;
pub mod turso;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Conversation, Message, MessageRole};

pub use memory::MemoryStore;
pub use turso::TursoStore;

#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Upsert the conversation (setting its last-message snapshot to `text`)
    /// and insert a new message, committed as one unit. Readers never observe
    /// one effect without the other.
    async fn append_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        text: &str,
    ) -> Result<(Conversation, Message)>;

    /// Messages of a conversation, oldest first
    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>>;

    /// All conversations, newest first by creation time
    async fn list_conversations(&self) -> Result<Vec<Conversation>>;

    async fn get_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>>;

    /// Returns `None` when the conversation does not exist
    async fn set_ai_enabled(
        &self,
        conversation_id: &str,
        enabled: bool,
    ) -> Result<Option<Conversation>>;
}
