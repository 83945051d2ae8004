//! Responder orchestrator
//!
//! One reply cycle per inbound visitor message:
//!
//! ```text
//! Evaluating ──(not a user message / AI disabled / gate says no)──> Skipped
//!     │
//!     └──> Responding: typing on → generate → delay → typing off → persist → publish
//! ```
//!
//! The responding branch runs on its own spawned task so the inbound request
//! is acknowledged as soon as the visitor message is persisted. Nothing in the
//! branch propagates an error: failures are logged from inside the task.

use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use rand::Rng;
use std::panic::AssertUnwindSafe;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::Responder;
use crate::error::GenerationError;
use crate::gateway::{MessageStoreGateway, RecordedMessage};
use crate::models::{Message, MessageRole};
use crate::realtime::{BroadcastDispatcher, TypingPayload};

pub const FALLBACK_REPLY: &str = "I apologize, but I'm having trouble processing your request right now. A human agent has been notified and will assist you shortly.";

/// Sent instead of [`FALLBACK_REPLY`] when no generator is configured at all
pub const UNAVAILABLE_REPLY: &str = "I'm currently unavailable. Please contact our support team for assistance.";

#[derive(Debug, Clone)]
pub struct ReplySettings {
    /// Most recent messages handed to the generator
    pub history_limit: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub fallback_text: String,
    pub unavailable_text: String,
    /// Re-read the AI flag right before persisting and discard the reply if
    /// an admin disabled AI while it was being generated.
    pub drop_if_disabled: bool,
}

impl Default for ReplySettings {
    fn default() -> Self {
        Self {
            history_limit: 5,
            min_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(2000),
            fallback_text: FALLBACK_REPLY.to_string(),
            unavailable_text: UNAVAILABLE_REPLY.to_string(),
            drop_if_disabled: false,
        }
    }
}

/// Result of the evaluating step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Not a visitor message, or AI is disabled for the conversation
    Skip,
    /// The responder's own gate rejected the text
    Decline,
    Respond,
}

/// How a responding cycle ended
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyOutcome {
    Replied { message: Message, fallback: bool },
    /// AI was disabled mid-generation and the reply was discarded
    Dropped,
    /// The reply could not be persisted, or the task panicked
    Failed,
}

/// Emits typing-on when created and typing-off exactly once when stopped or
/// dropped, whichever comes first.
struct TypingGuard {
    dispatcher: BroadcastDispatcher,
    conversation_id: String,
    active: bool,
}

impl TypingGuard {
    fn start(dispatcher: BroadcastDispatcher, conversation_id: &str) -> Self {
        dispatcher.typing(conversation_id, TypingPayload { is_typing: true, role: MessageRole::Ai });
        Self {
            dispatcher,
            conversation_id: conversation_id.to_string(),
            active: true,
        }
    }

    fn stop(mut self) {
        self.emit_stop();
    }

    fn emit_stop(&mut self) {
        if std::mem::replace(&mut self.active, false) {
            self.dispatcher.typing(
                &self.conversation_id,
                TypingPayload { is_typing: false, role: MessageRole::Ai },
            );
        }
    }
}

impl Drop for TypingGuard {
    fn drop(&mut self) {
        self.emit_stop();
    }
}

pub struct ResponderOrchestrator {
    gateway: Arc<MessageStoreGateway>,
    dispatcher: BroadcastDispatcher,
    responder: Arc<dyn Responder>,
    settings: ReplySettings,
}

impl ResponderOrchestrator {
    pub fn new(
        gateway: Arc<MessageStoreGateway>,
        dispatcher: BroadcastDispatcher,
        responder: Arc<dyn Responder>,
        settings: ReplySettings,
    ) -> Self {
        Self {
            gateway,
            dispatcher,
            responder,
            settings,
        }
    }

    pub fn evaluate(&self, recorded: &RecordedMessage) -> Decision {
        if recorded.message.role != MessageRole::User || !recorded.conversation.ai_enabled {
            return Decision::Skip;
        }
        if !self.responder.should_respond(&recorded.message.text) {
            return Decision::Decline;
        }
        Decision::Respond
    }

    /// Evaluate `recorded` and, if a reply is due, spawn the responding cycle.
    /// The handle may be dropped; the task keeps running and logs its own
    /// failures.
    pub fn dispatch(self: &Arc<Self>, recorded: &RecordedMessage) -> Option<JoinHandle<ReplyOutcome>> {
        let decision = self.evaluate(recorded);
        if decision != Decision::Respond {
            debug!(
                conversation_id = %recorded.message.conversation_id,
                decision = ?decision,
                "No automated reply"
            );
            return None;
        }

        let this = Arc::clone(self);
        let inbound = recorded.message.clone();
        Some(tokio::spawn(async move {
            let conversation_id = inbound.conversation_id.clone();
            match AssertUnwindSafe(this.respond(inbound)).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(_) => {
                    error!(conversation_id = %conversation_id, "Automated reply task panicked");
                    ReplyOutcome::Failed
                }
            }
        }))
    }

    async fn respond(&self, inbound: Message) -> ReplyOutcome {
        let conversation_id = inbound.conversation_id.as_str();
        let typing = TypingGuard::start(self.dispatcher.clone(), conversation_id);

        let history = self.recent_history(&inbound).await;
        let (text, fallback) = match self.responder.generate_reply(&inbound.text, &history).await {
            Ok(reply) if !reply.trim().is_empty() => (reply, false),
            Ok(_) => {
                warn!(conversation_id, "Generator returned a blank reply; using fallback");
                (self.settings.fallback_text.clone(), true)
            }
            Err(GenerationError::Unavailable) => {
                warn!(conversation_id, "Reply generator unavailable");
                (self.settings.unavailable_text.clone(), true)
            }
            Err(e) => {
                warn!(conversation_id, error = %e, "Reply generation failed; using fallback");
                (self.settings.fallback_text.clone(), true)
            }
        };

        tokio::time::sleep(self.reply_delay()).await;
        typing.stop();

        if self.settings.drop_if_disabled && !self.ai_still_enabled(conversation_id).await {
            info!(conversation_id, "AI disabled during generation; reply dropped");
            return ReplyOutcome::Dropped;
        }

        match self.gateway.record(conversation_id, MessageRole::Ai, &text).await {
            Ok(recorded) => {
                self.dispatcher.new_message(&recorded.message);
                info!(
                    conversation_id,
                    message_id = %recorded.message.id,
                    fallback,
                    "Automated reply sent"
                );
                ReplyOutcome::Replied {
                    message: recorded.message,
                    fallback,
                }
            }
            Err(e) => {
                error!(conversation_id, error = %e, "Failed to persist automated reply");
                ReplyOutcome::Failed
            }
        }
    }

    /// Up to `history_limit` messages preceding the inbound one, oldest first
    async fn recent_history(&self, inbound: &Message) -> Vec<Message> {
        let mut history = match self.gateway.get_history(&inbound.conversation_id).await {
            Ok(history) => history,
            Err(e) => {
                warn!(conversation_id = %inbound.conversation_id, error = %e, "History unavailable; generating without context");
                return Vec::new();
            }
        };
        history.retain(|m| m.id != inbound.id);
        let skip = history.len().saturating_sub(self.settings.history_limit);
        history.split_off(skip)
    }

    async fn ai_still_enabled(&self, conversation_id: &str) -> bool {
        match self.gateway.get_conversation(conversation_id).await {
            Ok(Some(conversation)) => conversation.ai_enabled,
            Ok(None) => false,
            Err(e) => {
                // Can't tell; keep the default accepted-race behaviour.
                warn!(conversation_id, error = %e, "Could not re-check AI flag");
                true
            }
        }
    }

    fn reply_delay(&self) -> Duration {
        let min = self.settings.min_delay.as_millis() as u64;
        let max = self.settings.max_delay.as_millis() as u64;
        if max <= min {
            return Duration::from_millis(min);
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}
