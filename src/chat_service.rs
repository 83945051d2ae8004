//! Chat service
//!
//! Wires the gateway, the dispatcher and the responder orchestrator into the
//! operations the transports expose. Persistence happens first; fan-out and
//! the automated reply only follow a successful write.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::error::ChatResult;
use crate::gateway::MessageStoreGateway;
use crate::models::{Conversation, Message};
use crate::realtime::{
    BroadcastDispatcher, ConnectionId, ConversationUpdate, Delivery, Room, RoomRegistry, ServerEvent,
    TypingPayload,
};
use crate::responder::{ReplyOutcome, ReplySettings, Responder, ResponderOrchestrator};
use crate::store::ChatStore;

/// An acknowledged inbound message
#[derive(Debug)]
pub struct SentMessage {
    pub message: Message,
    /// The detached automated-reply task, if one was started
    pub reply: Option<JoinHandle<ReplyOutcome>>,
}

pub struct ChatService {
    gateway: Arc<MessageStoreGateway>,
    dispatcher: BroadcastDispatcher,
    orchestrator: Arc<ResponderOrchestrator>,
}

impl ChatService {
    pub fn new(
        store: Arc<dyn ChatStore>,
        rooms: Arc<RoomRegistry>,
        responder: Arc<dyn Responder>,
        settings: ReplySettings,
    ) -> Self {
        let gateway = Arc::new(MessageStoreGateway::new(store));
        let dispatcher = BroadcastDispatcher::new(rooms);
        let orchestrator = Arc::new(ResponderOrchestrator::new(
            Arc::clone(&gateway),
            dispatcher.clone(),
            responder,
            settings,
        ));

        Self {
            gateway,
            dispatcher,
            orchestrator,
        }
    }

    pub fn rooms(&self) -> &Arc<RoomRegistry> {
        self.dispatcher.rooms()
    }

    /// Persist, broadcast `new_message`, then maybe start an automated reply.
    /// Returns as soon as the message is stored and fanned out.
    pub async fn send_message(&self, conversation_id: &str, role: &str, text: &str) -> ChatResult<SentMessage> {
        let recorded = self.gateway.record_message(conversation_id, role, text).await?;
        self.dispatcher.new_message(&recorded.message);
        let reply = self.orchestrator.dispatch(&recorded);

        info!(
            conversation_id,
            message_id = %recorded.message.id,
            role = %recorded.message.role,
            auto_reply = reply.is_some(),
            "Message accepted"
        );

        Ok(SentMessage {
            message: recorded.message,
            reply,
        })
    }

    pub async fn history(&self, conversation_id: &str) -> ChatResult<Vec<Message>> {
        self.gateway.get_history(conversation_id).await
    }

    pub async fn conversations(&self) -> ChatResult<Vec<Conversation>> {
        self.gateway.list_conversations().await
    }

    /// Flip the AI flag and tell the conversation and the admin list about it
    pub async fn toggle_ai(&self, conversation_id: &str, enabled: bool) -> ChatResult<Conversation> {
        let conversation = self.gateway.set_ai_enabled(conversation_id, enabled).await?;
        self.dispatcher.conversation_update(ConversationUpdate {
            id: conversation.id.clone(),
            ai_enabled: conversation.ai_enabled,
        });
        info!(conversation_id, ai_enabled = enabled, "AI toggled");
        Ok(conversation)
    }

    /// Relay a client's typing indicator to the rest of the conversation room
    pub fn relay_typing(&self, sender: ConnectionId, conversation_id: &str, payload: TypingPayload) -> Delivery {
        self.dispatcher.publish_excluding(
            &Room::conversation(conversation_id),
            ServerEvent::Typing(payload),
            sender,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ChatError, GenerationError};
    use crate::models::MessageRole;
    use crate::realtime::ConnectionHandle;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct EchoResponder;

    #[async_trait]
    impl Responder for EchoResponder {
        fn should_respond(&self, text: &str) -> bool {
            text.len() >= 2
        }

        async fn generate_reply(&self, text: &str, _history: &[Message]) -> Result<String, GenerationError> {
            Ok(format!("You said: {text}"))
        }
    }

    /// Storage that refuses every write
    struct ReadOnlyStore;

    #[async_trait]
    impl ChatStore for ReadOnlyStore {
        async fn append_message(&self, _: &str, _: MessageRole, _: &str) -> anyhow::Result<(Conversation, Message)> {
            anyhow::bail!("database is read-only")
        }
        async fn list_messages(&self, _: &str) -> anyhow::Result<Vec<Message>> {
            Ok(Vec::new())
        }
        async fn list_conversations(&self) -> anyhow::Result<Vec<Conversation>> {
            Ok(Vec::new())
        }
        async fn get_conversation(&self, _: &str) -> anyhow::Result<Option<Conversation>> {
            Ok(None)
        }
        async fn set_ai_enabled(&self, _: &str, _: bool) -> anyhow::Result<Option<Conversation>> {
            Ok(None)
        }
    }

    /// Records whether the gate was ever consulted
    #[derive(Default)]
    struct WatchingResponder {
        asked: AtomicBool,
    }

    #[async_trait]
    impl Responder for WatchingResponder {
        fn should_respond(&self, _text: &str) -> bool {
            self.asked.store(true, Ordering::SeqCst);
            true
        }

        async fn generate_reply(&self, _text: &str, _history: &[Message]) -> Result<String, GenerationError> {
            Ok("unreachable".to_string())
        }
    }

    fn service() -> ChatService {
        let settings = ReplySettings {
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            ..ReplySettings::default()
        };
        ChatService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(RoomRegistry::new()),
            Arc::new(EchoResponder),
            settings,
        )
    }

    fn drain(rx: &mut mpsc::Receiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_send_message_broadcasts_then_replies() {
        let chat = service();
        let (visitor, mut visitor_rx) = ConnectionHandle::channel(16);
        let (admin, mut admin_rx) = ConnectionHandle::channel(16);
        chat.rooms().join(&visitor, Room::conversation("c1"));
        chat.rooms().join(&admin, Room::Admin);

        let sent = chat.send_message("c1", "user", "hello").await.unwrap();
        assert_eq!(drain(&mut visitor_rx), vec![ServerEvent::NewMessage(sent.message.clone())]);

        let outcome = sent.reply.unwrap().await.unwrap();
        assert!(matches!(outcome, ReplyOutcome::Replied { ref message, .. } if message.text == "You said: hello"));

        let admin_events = drain(&mut admin_rx);
        assert_eq!(admin_events.len(), 2);
        assert!(admin_events.iter().all(|e| matches!(e, ServerEvent::NewMessage(_))));
        assert_eq!(chat.history("c1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_admin_message_gets_no_reply() {
        let chat = service();
        let sent = chat.send_message("c1", "admin", "An agent will be with you").await.unwrap();
        assert!(sent.reply.is_none());
        assert_eq!(sent.message.role, MessageRole::Admin);
    }

    #[tokio::test]
    async fn test_rejected_message_broadcasts_nothing() {
        let chat = service();
        let (admin, mut admin_rx) = ConnectionHandle::channel(16);
        chat.rooms().join(&admin, Room::Admin);

        let err = chat.send_message("c1", "bot", "hello").await.unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));
        assert!(drain(&mut admin_rx).is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_broadcasts_nothing_and_skips_reply() {
        let responder = Arc::new(WatchingResponder::default());
        let chat = ChatService::new(
            Arc::new(ReadOnlyStore),
            Arc::new(RoomRegistry::new()),
            responder.clone(),
            ReplySettings::default(),
        );
        let (visitor, mut visitor_rx) = ConnectionHandle::channel(16);
        let (admin, mut admin_rx) = ConnectionHandle::channel(16);
        chat.rooms().join(&visitor, Room::conversation("c1"));
        chat.rooms().join(&admin, Room::Admin);

        let err = chat.send_message("c1", "user", "hello there").await.unwrap_err();

        assert!(matches!(err, ChatError::Storage(_)));
        assert!(drain(&mut visitor_rx).is_empty());
        assert!(drain(&mut admin_rx).is_empty());
        assert!(!responder.asked.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_toggle_ai_publishes_update() {
        let chat = service();
        let (visitor, mut visitor_rx) = ConnectionHandle::channel(16);
        let (admin, mut admin_rx) = ConnectionHandle::channel(16);

        chat.send_message("c1", "admin", "welcome").await.unwrap();
        chat.rooms().join(&visitor, Room::conversation("c1"));
        chat.rooms().join(&admin, Room::Admin);

        let conversation = chat.toggle_ai("c1", false).await.unwrap();
        assert!(!conversation.ai_enabled);

        let expected = ServerEvent::ConversationUpdate(ConversationUpdate { id: "c1".into(), ai_enabled: false });
        assert_eq!(drain(&mut visitor_rx), vec![expected.clone()]);
        assert_eq!(drain(&mut admin_rx), vec![expected]);

        let sent = chat.send_message("c1", "user", "anyone there?").await.unwrap();
        assert!(sent.reply.is_none());
    }

    #[tokio::test]
    async fn test_toggle_missing_conversation() {
        let chat = service();
        let (admin, mut admin_rx) = ConnectionHandle::channel(16);
        chat.rooms().join(&admin, Room::Admin);

        assert!(matches!(chat.toggle_ai("ghost", false).await, Err(ChatError::NotFound(_))));
        assert!(drain(&mut admin_rx).is_empty());
    }

    #[test]
    fn test_relay_typing_skips_sender() {
        let chat = service();
        let (sender, mut sender_rx) = ConnectionHandle::channel(16);
        let (peer, mut peer_rx) = ConnectionHandle::channel(16);
        chat.rooms().join(&sender, Room::conversation("c1"));
        chat.rooms().join(&peer, Room::conversation("c1"));

        let payload = TypingPayload { is_typing: true, role: MessageRole::Admin };
        let delivery = chat.relay_typing(sender.id(), "c1", payload);

        assert_eq!(delivery.delivered, 1);
        assert!(drain(&mut sender_rx).is_empty());
        assert_eq!(drain(&mut peer_rx), vec![ServerEvent::Typing(payload)]);
    }
}
