use std::collections::VecDeque;

use crate::protocol::{Notification, NotificationKind};

/// Client-side notification aggregation.
///
/// Message and generic notifications feed two separate badge counters
/// and are never merged. Each stream is a bounded ring, most recent
/// first; on overflow the oldest entry is dropped. Created at session
/// start and owned by the session, not ambient global state.
#[derive(Debug)]
pub struct NotificationStore {
    capacity: usize,
    messages: VecDeque<Notification>,
    generic: VecDeque<Notification>,
}

impl NotificationStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            messages: VecDeque::new(),
            generic: VecDeque::new(),
        }
    }

    pub fn push(&mut self, notification: Notification) {
        let ring = match notification.kind {
            NotificationKind::Message => &mut self.messages,
            NotificationKind::Generic => &mut self.generic,
        };
        ring.push_front(notification);
        ring.truncate(self.capacity);
    }

    /// Unread message-notification badge count.
    pub fn message_unread(&self) -> usize {
        self.messages.len()
    }

    /// Unread generic-notification badge count.
    pub fn generic_unread(&self) -> usize {
        self.generic.len()
    }

    /// Unread message notifications, most recent first.
    pub fn message_notifications(&self) -> impl Iterator<Item = &Notification> {
        self.messages.iter()
    }

    pub fn generic_notifications(&self) -> impl Iterator<Item = &Notification> {
        self.generic.iter()
    }

    pub fn clear_messages(&mut self) {
        self.messages.clear();
    }

    pub fn clear_generic(&mut self) {
        self.generic.clear();
    }

    pub fn clear_all(&mut self) {
        self.messages.clear();
        self.generic.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn notification(kind: NotificationKind, content: &str) -> Notification {
        Notification {
            kind,
            booking_id: "b1".to_string(),
            from_user: "u1".to_string(),
            to_user: "u2".to_string(),
            message_id: None,
            content: content.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn counters_are_independent() {
        let mut store = NotificationStore::new(10);
        store.push(notification(NotificationKind::Message, "hi"));
        store.push(notification(NotificationKind::Message, "there"));
        store.push(notification(NotificationKind::Generic, "review"));

        assert_eq!(store.message_unread(), 2);
        assert_eq!(store.generic_unread(), 1);

        store.clear_messages();
        assert_eq!(store.message_unread(), 0);
        assert_eq!(store.generic_unread(), 1);
    }

    #[test]
    fn most_recent_first_with_drop_oldest_overflow() {
        let mut store = NotificationStore::new(3);
        for i in 0..5 {
            store.push(notification(NotificationKind::Message, &format!("n{i}")));
        }
        let contents: Vec<&str> = store
            .message_notifications()
            .map(|n| n.content.as_str())
            .collect();
        assert_eq!(contents, vec!["n4", "n3", "n2"]);
    }
}
