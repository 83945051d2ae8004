//! Live event types exchanged over WebSocket connections
//!
//! Frames are JSON objects of the form `{"event": <name>, "data": <payload>}`.

use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Message, MessageRole};

// =============================================================================
// Client-to-Server Events
// =============================================================================

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Persist a message; the role stays raw so bad values fail validation
    #[serde(rename_all = "camelCase")]
    SendMessage {
        conversation_id: String,
        role: String,
        message: String,
    },

    /// `admin_join_conversation` is the admin UI's name for the same thing
    #[serde(alias = "admin_join_conversation")]
    JoinConversation(ConversationTarget),

    LeaveConversation(ConversationTarget),

    /// Observe every conversation. Any payload is ignored.
    AdminJoin(Option<IgnoredAny>),

    #[serde(rename_all = "camelCase")]
    Typing {
        conversation_id: String,
        is_typing: bool,
        role: MessageRole,
    },

    #[serde(rename_all = "camelCase")]
    ToggleAi {
        conversation_id: String,
        ai_enabled: bool,
    },

    Ping(Option<IgnoredAny>),
}

/// Conversation named either as `{"conversationId": ..}` or as a bare string
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ConversationTarget {
    #[serde(rename_all = "camelCase")]
    Keyed { conversation_id: String },
    Bare(String),
}

impl ConversationTarget {
    pub fn into_id(self) -> String {
        match self {
            ConversationTarget::Keyed { conversation_id } | ConversationTarget::Bare(conversation_id) => conversation_id,
        }
    }
}

// =============================================================================
// Server-to-Client Events
// =============================================================================

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    NewMessage(Message),
    Typing(TypingPayload),
    ConversationUpdate(ConversationUpdate),

    /// Acknowledges a `send_message` to its sender only
    MessageSaved(Message),

    #[serde(rename_all = "camelCase")]
    Connected { connection_id: Uuid },

    Error { message: String },

    Pong,
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::NewMessage(_) => "new_message",
            ServerEvent::Typing(_) => "typing",
            ServerEvent::ConversationUpdate(_) => "conversation_update",
            ServerEvent::MessageSaved(_) => "message_saved",
            ServerEvent::Connected { .. } => "connected",
            ServerEvent::Error { .. } => "error",
            ServerEvent::Pong => "pong",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub is_typing: bool,
    pub role: MessageRole,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationUpdate {
    pub id: String,
    pub ai_enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_event_deserialization() {
        let raw = r#"{"event":"send_message","data":{"conversationId":"c1","role":"user","message":"hi"}}"#;
        let event: ClientEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(
            event,
            ClientEvent::SendMessage {
                conversation_id: "c1".into(),
                role: "user".into(),
                message: "hi".into(),
            }
        );

        let raw = r#"{"event":"typing","data":{"conversationId":"c1","isTyping":true,"role":"admin"}}"#;
        let event: ClientEvent = serde_json::from_str(raw).unwrap();
        assert!(matches!(event, ClientEvent::Typing { is_typing: true, role: MessageRole::Admin, .. }));

        let event: ClientEvent = serde_json::from_str(r#"{"event":"admin_join"}"#).unwrap();
        assert!(matches!(event, ClientEvent::AdminJoin(_)));
    }

    #[test]
    fn test_payload_free_events_accept_any_data() {
        for data in [r#""#, r#","data":null"#, r#","data":{}"#] {
            let admin = format!(r#"{{"event":"admin_join"{data}}}"#);
            let ping = format!(r#"{{"event":"ping"{data}}}"#);
            assert!(matches!(serde_json::from_str::<ClientEvent>(&admin).unwrap(), ClientEvent::AdminJoin(_)), "{admin}");
            assert!(matches!(serde_json::from_str::<ClientEvent>(&ping).unwrap(), ClientEvent::Ping(_)), "{ping}");
        }
    }

    #[test]
    fn test_join_accepts_keyed_bare_and_admin_alias() {
        let frames = [
            r#"{"event":"join_conversation","data":{"conversationId":"c1"}}"#,
            r#"{"event":"join_conversation","data":"c1"}"#,
            r#"{"event":"admin_join_conversation","data":"c1"}"#,
        ];
        for raw in frames {
            match serde_json::from_str::<ClientEvent>(raw).unwrap() {
                ClientEvent::JoinConversation(target) => assert_eq!(target.into_id(), "c1"),
                other => panic!("unexpected event {other:?} for {raw}"),
            }
        }

        let leave: ClientEvent = serde_json::from_str(r#"{"event":"leave_conversation","data":"c1"}"#).unwrap();
        assert_eq!(leave, ClientEvent::LeaveConversation(ConversationTarget::Bare("c1".into())));
    }

    #[test]
    fn test_unknown_client_event_is_rejected() {
        assert!(serde_json::from_str::<ClientEvent>(r#"{"event":"shutdown"}"#).is_err());
    }

    #[test]
    fn test_typing_event_serialization() {
        let event = ServerEvent::Typing(TypingPayload { is_typing: false, role: MessageRole::Ai });
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({ "event": "typing", "data": { "isTyping": false, "role": "ai" } })
        );
    }

    #[test]
    fn test_conversation_update_serialization() {
        let event = ServerEvent::ConversationUpdate(ConversationUpdate { id: "c1".into(), ai_enabled: false });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], event.name());
        assert_eq!(json["data"], json!({ "id": "c1", "aiEnabled": false }));
    }

    #[test]
    fn test_pong_serialization() {
        assert_eq!(serde_json::to_string(&ServerEvent::Pong).unwrap(), r#"{"event":"pong"}"#);
    }
}
