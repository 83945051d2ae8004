use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::ChatStore;
use crate::models::{Conversation, Message, MessageRole};

#[derive(Default)]
struct Tables {
    conversations: HashMap<String, Conversation>,
    // Insertion order doubles as creation order.
    messages: Vec<Message>,
}

impl Tables {
    fn upsert_conversation(&mut self, id: &str, last_message: &str) -> Conversation {
        let now = Utc::now();
        let conversation = self
            .conversations
            .entry(id.to_string())
            .and_modify(|c| {
                c.last_message = Some(last_message.to_string());
                c.updated_at = now;
            })
            .or_insert_with(|| Conversation::started(id.to_string(), last_message.to_string()));
        conversation.clone()
    }

    fn insert_message(&mut self, conversation_id: &str, role: MessageRole, text: &str) -> Message {
        let message = Message::new(conversation_id.to_string(), role, text.to_string());
        self.messages.push(message.clone());
        message
    }
}

/// In-process store. Both tables live behind one lock, which is what makes
/// `append_message` atomic for readers.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn append_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        text: &str,
    ) -> Result<(Conversation, Message)> {
        let mut tables = self.tables.write().await;
        let conversation = tables.upsert_conversation(conversation_id, text);
        let message = tables.insert_message(conversation_id, role, text);
        Ok((conversation, message))
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let tables = self.tables.read().await;
        let mut messages: Vec<Message> = tables
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal timestamps.
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(messages)
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        let tables = self.tables.read().await;
        let mut conversations: Vec<Conversation> =
            tables.conversations.values().cloned().collect();
        conversations.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(conversations)
    }

    async fn get_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        let tables = self.tables.read().await;
        Ok(tables.conversations.get(conversation_id).cloned())
    }

    async fn set_ai_enabled(
        &self,
        conversation_id: &str,
        enabled: bool,
    ) -> Result<Option<Conversation>> {
        let mut tables = self.tables.write().await;
        Ok(tables.conversations.get_mut(conversation_id).map(|c| {
            c.ai_enabled = enabled;
            c.updated_at = Utc::now();
            c.clone()
        }))
    }
}
