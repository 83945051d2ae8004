//! Real-time fan-out for live connections
//!
//! - **Connection**: a live connection's outbound queue
//! - **Rooms**: membership of connections per conversation plus the admin room
//! - **Dispatcher**: room-scoped, non-blocking event fan-out
//! - **Socket**: the axum WebSocket endpoint
//! - **Events**: client/server event definitions

pub mod connection;
pub mod dispatcher;
pub mod events;
pub mod rooms;
pub mod socket;

pub use connection::{ConnectionHandle, ConnectionId};
pub use dispatcher::{BroadcastDispatcher, Delivery};
pub use events::{ClientEvent, ConversationTarget, ConversationUpdate, ServerEvent, TypingPayload};
pub use rooms::{Room, RoomRegistry};
