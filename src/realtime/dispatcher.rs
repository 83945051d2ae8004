//! Broadcast dispatcher
//!
//! Fans events out to the members of one or more rooms, using the registry
//! snapshot taken at call time. Delivery is `try_send` onto each connection's
//! bounded queue: publishing never waits on a receiver and never fails.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use super::connection::{ConnectionId, DeliveryFailure};
use super::events::{ConversationUpdate, ServerEvent, TypingPayload};
use super::rooms::{Room, RoomRegistry};
use crate::models::Message;

/// Outcome tally of one publish call
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub dropped: usize,
}

#[derive(Clone)]
pub struct BroadcastDispatcher {
    rooms: Arc<RoomRegistry>,
}

impl BroadcastDispatcher {
    pub fn new(rooms: Arc<RoomRegistry>) -> Self {
        Self { rooms }
    }

    pub fn rooms(&self) -> &Arc<RoomRegistry> {
        &self.rooms
    }

    /// Deliver an event to every connection currently in `room`
    pub fn publish(&self, room: &Room, event: ServerEvent) -> Delivery {
        self.fan_out(std::slice::from_ref(room), event, None)
    }

    /// Like [`publish`](Self::publish) but skips the sending connection
    pub fn publish_excluding(&self, room: &Room, event: ServerEvent, sender: ConnectionId) -> Delivery {
        self.fan_out(std::slice::from_ref(room), event, Some(sender))
    }

    /// `new_message` goes to the conversation room and the admin room
    pub fn new_message(&self, message: &Message) -> Delivery {
        self.fan_out(
            &[Room::conversation(message.conversation_id.as_str()), Room::Admin],
            ServerEvent::NewMessage(message.clone()),
            None,
        )
    }

    /// `typing` goes to the conversation room only
    pub fn typing(&self, conversation_id: &str, payload: TypingPayload) -> Delivery {
        self.publish(&Room::conversation(conversation_id), ServerEvent::Typing(payload))
    }

    /// `conversation_update` goes to the conversation room and the admin room
    pub fn conversation_update(&self, update: ConversationUpdate) -> Delivery {
        self.fan_out(
            &[Room::conversation(update.id.as_str()), Room::Admin],
            ServerEvent::ConversationUpdate(update),
            None,
        )
    }

    /// A connection that sits in several target rooms receives the event once.
    fn fan_out(&self, rooms: &[Room], event: ServerEvent, exclude: Option<ConnectionId>) -> Delivery {
        let mut seen = HashSet::new();
        let mut tally = Delivery::default();

        for room in rooms {
            for conn in self.rooms.members_of(room) {
                if Some(conn.id()) == exclude || !seen.insert(conn.id()) {
                    continue;
                }
                match conn.try_deliver(event.clone()) {
                    Ok(()) => tally.delivered += 1,
                    Err(DeliveryFailure::Full) => {
                        tally.dropped += 1;
                        warn!(
                            connection_id = %conn.id(),
                            event = event.name(),
                            "Dropped event for slow connection (queue full)"
                        );
                    }
                    // Disconnecting; its handler is about to call leave_all.
                    Err(DeliveryFailure::Closed) => tally.dropped += 1,
                }
            }
        }

        debug!(
            event = event.name(),
            rooms = ?rooms.iter().map(ToString::to_string).collect::<Vec<_>>(),
            recipients = tally.delivered,
            dropped = tally.dropped,
            "Broadcast event"
        );
        tally
    }
}
