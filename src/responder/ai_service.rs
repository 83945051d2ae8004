use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, warn};

use super::Responder;
use crate::error::GenerationError;
use crate::models::{Message, MessageRole};

pub const SYSTEM_PROMPT: &str =
    "You are a helpful customer support assistant. Be friendly, concise, and helpful.";

const MAX_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AIMessage {
    pub role: String,
    pub content: String,
}

impl AIMessage {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

impl From<&Message> for AIMessage {
    fn from(message: &Message) -> Self {
        // Admin replies speak for the desk, same as the bot.
        let role = match message.role {
            MessageRole::User => "user",
            MessageRole::Ai | MessageRole::Admin => "assistant",
        };
        AIMessage::new(role, &message.text)
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<AIMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AIMessage,
}

/// -----------------------------
/// AI Service (Groq / OpenAI compatible)
/// -----------------------------
pub struct AIService {
    client: Client,
    model: String,
    api_key: Option<String>,
    base_url: String,
}

impl AIService {
    /// Without an API key the service stays constructible but every
    /// generation fails with [`GenerationError::Unavailable`].
    pub fn new(model: String, api_key: Option<String>, base_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("support-relay/1.0")
            .build()
            .context("Failed to build HTTP client")?;

        let api_key = api_key.filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            warn!("No AI API key configured; automated replies will use the fallback text");
        }

        Ok(Self {
            client,
            model,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    /// System prompt, then history, then the new customer message
    fn build_messages(user_message: &str, history: &[Message]) -> Vec<AIMessage> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(AIMessage::new("system", SYSTEM_PROMPT));
        messages.extend(history.iter().map(AIMessage::from));
        messages.push(AIMessage::new("user", user_message));
        messages
    }

    async fn complete(&self, api_key: &str, request: &ChatCompletionRequest) -> Result<String, GenerationError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut last_error = GenerationError::EmptyResponse;

        // Simple retry loop for transient failures
        for attempt in 1..=MAX_ATTEMPTS {
            let response = self
                .client
                .post(&url)
                .bearer_auth(api_key)
                .json(request)
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    let body: ChatCompletionResponse = resp
                        .json()
                        .await
                        .context("Failed to parse chat completion JSON")
                        .map_err(GenerationError::Upstream)?;

                    let content = body
                        .choices
                        .first()
                        .map(|c| c.message.content.trim().to_string())
                        .filter(|c| !c.is_empty())
                        .ok_or(GenerationError::EmptyResponse)?;

                    return Ok(content);
                }

                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    error!(attempt, status = %status, body = %body, "AI API error");
                    last_error = GenerationError::Upstream(anyhow::anyhow!("AI API returned {}", status));
                    if status.is_client_error() {
                        break;
                    }
                }

                Err(e) if e.is_timeout() => {
                    error!(attempt, "AI request timed out");
                    last_error = GenerationError::Timeout;
                }

                Err(e) => {
                    error!(attempt, error = %e, "AI request failed");
                    last_error = GenerationError::Upstream(anyhow::Error::new(e).context("AI request failed"));
                }
            }
        }

        Err(last_error)
    }
}

#[async_trait]
impl Responder for AIService {
    /// Don't respond to very short messages or lone emoji
    fn should_respond(&self, text: &str) -> bool {
        text.trim().chars().count() >= 2
    }

    async fn generate_reply(&self, text: &str, history: &[Message]) -> Result<String, GenerationError> {
        let api_key = self.api_key.as_deref().ok_or(GenerationError::Unavailable)?;

        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: Self::build_messages(text, history),
            temperature: 0.7,
            max_tokens: 500,
        };

        self.complete(api_key, &request).await
    }
}
