//! Client-side conversation state with optimistic sends
//!
//! A send is an explicit transition: snapshot the list, append a provisional
//! message, then either settle it against the authoritative message or roll
//! the list back to the snapshot. Authoritative messages from broadcasts are
//! merged by identifier, so seeing the same event twice is harmless.

use std::future::Future;

use chrono::Utc;
use uuid::Uuid;

use crate::models::{Message, MessageRole};
use crate::realtime::TypingPayload;

pub const PROVISIONAL_PREFIX: &str = "temp-";

/// An optimistic send that has not been settled yet
#[must_use = "a pending send must be confirmed or rolled back"]
#[derive(Debug)]
pub struct PendingSend {
    snapshot: Vec<Message>,
    provisional: Message,
}

impl PendingSend {
    pub fn provisional(&self) -> &Message {
        &self.provisional
    }
}

/// How a confirmed send was reconciled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// The broadcast of the same message arrived first; the confirmation was
    /// dropped as a duplicate.
    AlreadyPresent,
    /// The provisional entry stands in until the next [`ConversationSession::refresh`].
    AwaitingRefresh,
}

#[derive(Debug, Clone)]
pub struct ConversationSession {
    conversation_id: String,
    messages: Vec<Message>,
    typing: Option<TypingPayload>,
}

impl ConversationSession {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            messages: Vec::new(),
            typing: None,
        }
    }

    /// Start from a fetched history
    pub fn with_history(conversation_id: impl Into<String>, history: Vec<Message>) -> Self {
        let mut session = Self::new(conversation_id);
        session.refresh(history);
        session
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn typing(&self) -> Option<TypingPayload> {
        self.typing
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.messages.iter().any(|m| m.id == message_id)
    }

    /// Snapshot, then append a provisional message
    pub fn begin_send(&mut self, role: MessageRole, text: impl Into<String>) -> PendingSend {
        let snapshot = self.messages.clone();
        let provisional = Message {
            id: format!("{}{}", PROVISIONAL_PREFIX, Uuid::new_v4()),
            conversation_id: self.conversation_id.clone(),
            role,
            text: text.into(),
            created_at: Utc::now(),
        };
        self.messages.push(provisional.clone());
        PendingSend { snapshot, provisional }
    }

    /// Settle a send that the server accepted
    pub fn confirm(&mut self, _pending: PendingSend, authoritative: &Message) -> Reconciliation {
        if self.contains(&authoritative.id) {
            Reconciliation::AlreadyPresent
        } else {
            Reconciliation::AwaitingRefresh
        }
    }

    /// Restore the list exactly as it was before the send
    pub fn rollback(&mut self, pending: PendingSend) {
        self.messages = pending.snapshot;
    }

    /// Optimistically send through `persist`, settling on its result
    pub async fn send<F, Fut, E>(&mut self, role: MessageRole, text: &str, persist: F) -> Result<(Message, Reconciliation), E>
    where
        F: FnOnce(String, MessageRole, String) -> Fut,
        Fut: Future<Output = Result<Message, E>>,
    {
        let pending = self.begin_send(role, text);
        match persist(self.conversation_id.clone(), role, text.to_string()).await {
            Ok(message) => {
                let reconciliation = self.confirm(pending, &message);
                Ok((message, reconciliation))
            }
            Err(e) => {
                self.rollback(pending);
                Err(e)
            }
        }
    }

    /// Merge a broadcast message. Returns whether it was appended.
    pub fn on_broadcast_message(&mut self, message: Message) -> bool {
        if message.conversation_id != self.conversation_id || self.contains(&message.id) {
            return false;
        }
        self.messages.push(message);
        true
    }

    pub fn on_typing(&mut self, payload: TypingPayload) {
        self.typing = Some(payload);
    }

    /// Replace everything with authoritative history, dropping provisional
    /// entries.
    pub fn refresh(&mut self, history: Vec<Message>) {
        self.messages = history
            .into_iter()
            .filter(|m| m.conversation_id == self.conversation_id)
            .collect();
    }
}
