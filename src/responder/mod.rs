//! Automated replies
//!
//! [`Responder`] is the reply-generator collaborator; [`AIService`] is the
//! shipped implementation. [`ResponderOrchestrator`] decides when to reply and
//! runs the typing/generate/persist/publish cycle on a spawned task.

pub mod ai_service;
pub mod orchestrator;

use async_trait::async_trait;

use crate::error::GenerationError;
use crate::models::Message;

pub use ai_service::{AIMessage, AIService};
pub use orchestrator::{ReplyOutcome, ReplySettings, ResponderOrchestrator};

#[async_trait]
pub trait Responder: Send + Sync {
    /// Cheap gate run before any typing signal is emitted
    fn should_respond(&self, text: &str) -> bool;

    /// Produce a reply to `text` given recent history (oldest first).
    /// Implementations apply their own timeout.
    async fn generate_reply(&self, text: &str, history: &[Message]) -> Result<String, GenerationError>;
}
