use std::collections::HashSet;

use crate::protocol::ChatMessage;

/// The visible, ordered message log for one conversation.
///
/// Every inbound message goes through the same id-keyed merge, whether
/// it arrived live or as part of the history fetch. That makes the log
/// safe against duplicate delivery across reconnects and against live
/// events racing the initial history load: each id lands exactly once,
/// in first-seen order.
#[derive(Debug, Default)]
pub struct ChatLog {
    messages: Vec<ChatMessage>,
    seen: HashSet<String>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message unless its id was already seen. Returns whether
    /// the message was actually added.
    pub fn merge(&mut self, message: ChatMessage) -> bool {
        if !self.seen.insert(message.id.clone()) {
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Merges a history batch, message by message. Returns how many were
    /// new. Live events applied before the history resolved stay put.
    pub fn merge_history(&mut self, history: Vec<ChatMessage>) -> usize {
        let mut added = 0;
        for message in history {
            if self.merge(message) {
                added += 1;
            }
        }
        added
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn msg(id: &str, content: &str) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            booking_id: "b1".to_string(),
            sender: "u1".to_string(),
            receiver: "u2".to_string(),
            content: content.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn duplicates_collapse_in_first_seen_order() {
        let mut log = ChatLog::new();
        for m in [msg("m1", "a"), msg("m2", "b"), msg("m1", "a"), msg("m3", "c"), msg("m2", "b")] {
            log.merge(m);
        }
        let ids: Vec<&str> = log.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn live_event_racing_history_is_kept_once() {
        let mut log = ChatLog::new();
        // Live echo lands before the history fetch resolves.
        assert!(log.merge(msg("m2", "live")));

        let merged = log.merge_history(vec![msg("m1", "old"), msg("m2", "live")]);
        assert_eq!(merged, 1);
        let ids: Vec<&str> = log.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m2", "m1"]);
        assert_eq!(log.len(), 2);
    }
}
