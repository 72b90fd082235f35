use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chat message as persisted by the store and echoed to room members.
///
/// The id is assigned by the store, never by the sender, so duplicate
/// delivery across reconnects can be collapsed by id alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub booking_id: String,
    pub sender: String,
    pub receiver: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// The two notification streams feed separate badge counters and must
/// never be merged into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationKind {
    Message,
    Generic,
}

/// A user-scoped event delivered independently of room membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub kind: NotificationKind,
    pub booking_id: String,
    pub from_user: String,
    pub to_user: String,
    /// Set when the notification was triggered by a concrete message.
    pub message_id: Option<String>,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Events a client sends over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// Registers the connection for user-scoped delivery. First write wins.
    Setup { user_id: String },
    JoinRoom { room_id: String, user_id: String },
    LeaveRoom { room_id: String, user_id: String },
    Typing { booking_id: String, user_id: String },
    StopTyping { booking_id: String, user_id: String },
    SendMessage {
        booking_id: String,
        sender_id: String,
        content: String,
    },
}

/// Events the server pushes to a connected session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Full message log for a room, sent once after a successful join.
    History {
        booking_id: String,
        messages: Vec<ChatMessage>,
    },
    NewMessage { message: ChatMessage },
    UserTyping { user_id: String },
    UserStoppedTyping { user_id: String },
    NewMessageNotification { notification: Notification },
    NewNotification { notification: Notification },
    MessageError { message: String },
}

/// Body of the `POST /notify` route used by the surrounding system to
/// push a generic notification at a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyRequest {
    pub user_id: String,
    pub from_user: String,
    #[serde(default)]
    pub booking_id: String,
    pub content: String,
}

impl NotifyRequest {
    pub fn into_notification(self) -> Notification {
        Notification {
            kind: NotificationKind::Generic,
            booking_id: self.booking_id,
            from_user: self.from_user,
            to_user: self.user_id,
            message_id: None,
            content: self.content,
            timestamp: Utc::now(),
        }
    }
}
