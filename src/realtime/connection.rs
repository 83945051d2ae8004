//! Live connection handles
//!
//! A handle is the sending half of a connection's bounded outbound queue.
//! The WebSocket task owns the receiving half and writes frames to the socket.

use std::fmt;

use tokio::sync::mpsc;
use uuid::Uuid;

use super::events::ServerEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Why a single delivery did not happen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// The outbound queue is full; the receiver is too slow
    Full,
    /// The receiving task is gone; the connection is disconnecting
    Closed,
}

#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sender: mpsc::Sender<ServerEvent>,
}

impl ConnectionHandle {
    /// Create a handle and the receiver that drains it
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                id: ConnectionId::new(),
                sender,
            },
            receiver,
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue an event without waiting
    pub fn try_deliver(&self, event: ServerEvent) -> Result<(), DeliveryFailure> {
        self.sender.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryFailure::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryFailure::Closed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deliver_until_full() {
        let (conn, mut rx) = ConnectionHandle::channel(1);

        assert_eq!(conn.try_deliver(ServerEvent::Pong), Ok(()));
        assert_eq!(conn.try_deliver(ServerEvent::Pong), Err(DeliveryFailure::Full));

        assert_eq!(rx.recv().await, Some(ServerEvent::Pong));
        assert_eq!(conn.try_deliver(ServerEvent::Pong), Ok(()));
    }

    #[test]
    fn test_deliver_to_closed_connection() {
        let (conn, rx) = ConnectionHandle::channel(4);
        drop(rx);
        assert_eq!(conn.try_deliver(ServerEvent::Pong), Err(DeliveryFailure::Closed));
    }

    #[test]
    fn test_ids_are_unique() {
        let (a, _ra) = ConnectionHandle::channel(1);
        let (b, _rb) = ConnectionHandle::channel(1);
        assert_ne!(a.id(), b.id());
    }
}
