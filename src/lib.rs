//! Realtime chat and notification layer for a booking marketplace.
//!
//! The server half keeps one session per WebSocket connection, scopes
//! messages and typing presence to per-booking rooms, and fans out
//! user-scoped notifications to sessions that do not have the room
//! open. The client half owns the connection lifecycle (reconnect,
//! registration, join replay) and the view-side state machines: a
//! deduplicated message log, the typing coordinator and the bounded
//! notification store.

pub mod chat_log;
pub mod client;
pub mod config;
pub mod conversation;
pub mod directory;
pub mod error;
pub mod notifications;
pub mod protocol;
pub mod room;
pub mod server;
pub mod store;
pub mod typing;

pub use chat_log::ChatLog;
pub use client::{ChatClient, ClientConfig};
pub use config::Config;
pub use conversation::{Conversation, OutgoingMessage};
pub use directory::{BookingDirectory, BookingParties, InMemoryDirectory};
pub use error::ChatError;
pub use notifications::NotificationStore;
pub use protocol::{ChatMessage, ClientEvent, Notification, NotificationKind, ServerEvent};
pub use room::RoomRegistry;
pub use server::Server;
pub use store::{InMemoryStore, MessageStore};
pub use typing::{RemoteTyping, TypingCoordinator, TypingSignal};
