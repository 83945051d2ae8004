use anyhow::{Context, Result};
use reqwest::{Client, Url};
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::models::{Conversation, Message, MessageRole};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewMessage<'a> {
    conversation_id: &'a str,
    role: MessageRole,
    message: &'a str,
}

/// REST client for the relay's chat API
#[derive(Clone)]
pub struct ChatApiClient {
    client: Client,
    base_url: Url,
}

impl ChatApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("support-relay/client")
            .build()
            .context("Failed to build reqwest client")?;

        let base_url = Url::parse(base_url).with_context(|| format!("Invalid API base URL: {base_url}"))?;

        Ok(Self { client, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("API base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Persist a message. Usable as the persist step of
    /// [`ConversationSession::send`](crate::session::ConversationSession::send).
    pub async fn save_message(&self, conversation_id: String, role: MessageRole, text: String) -> Result<Message> {
        let url = self.endpoint(&["api", "chat", "messages"])?;
        let body = NewMessage {
            conversation_id: &conversation_id,
            role,
            message: &text,
        };

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .context("Failed to send message")?
            .error_for_status()
            .context("Relay rejected message")?;

        response.json().await.context("Invalid message payload")
    }

    pub async fn get_chat_history(&self, conversation_id: &str) -> Result<Vec<Message>> {
        if conversation_id.is_empty() {
            debug!("No conversation id provided; skipping history fetch");
            return Ok(Vec::new());
        }

        let url = self.endpoint(&["api", "chat", "conversations", conversation_id, "messages"])?;
        self.client
            .get(url)
            .send()
            .await
            .context("Failed to fetch chat history")?
            .error_for_status()
            .context("Relay rejected history request")?
            .json()
            .await
            .context("Invalid history payload")
    }

    pub async fn get_all_conversations(&self) -> Result<Vec<Conversation>> {
        let url = self.endpoint(&["api", "chat", "conversations"])?;
        self.client
            .get(url)
            .send()
            .await
            .context("Failed to fetch conversations")?
            .error_for_status()
            .context("Relay rejected conversations request")?
            .json()
            .await
            .context("Invalid conversations payload")
    }

    pub async fn toggle_ai(&self, conversation_id: &str, ai_enabled: bool) -> Result<Conversation> {
        let url = self.endpoint(&["api", "chat", "conversations", conversation_id, "toggle-ai"])?;
        self.client
            .patch(url)
            .json(&json!({ "aiEnabled": ai_enabled }))
            .send()
            .await
            .context("Failed to toggle AI")?
            .error_for_status()
            .context("Relay rejected AI toggle")?
            .json()
            .await
            .context("Invalid conversation payload")
    }
}
