use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents who authored a message: the visitor, the automated responder
/// or a support-desk admin.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Ai,
    Admin,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Ai => "ai",
            MessageRole::Admin => "admin",
        }
    }

    /// Strict parse of the wire value. The role set is closed, so anything
    /// other than the three lowercase names is rejected.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(MessageRole::User),
            "ai" => Some(MessageRole::Ai),
            "admin" => Some(MessageRole::Admin),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents a single message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: MessageRole,
    #[serde(rename = "message")]
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(conversation_id: String, role: MessageRole, text: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id,
            role,
            text,
            created_at: Utc::now(),
        }
    }
}

/// Represents a conversation thread. One row per visitor session id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub last_message: Option<String>,
    pub ai_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// A conversation as it is created by its first message.
    pub fn started(id: String, last_message: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            last_message: Some(last_message),
            ai_enabled: true,
            created_at: now,
            updated_at: now,
        }
    }
}
