use std::time::{Duration, Instant};

use crate::chat_log::ChatLog;
use crate::directory::BookingParties;
use crate::error::ChatError;
use crate::protocol::{ClientEvent, ServerEvent};
use crate::typing::{RemoteTyping, TypingCoordinator, TypingSignal};

/// Everything a send needs to put on the wire, plus the typing stop
/// that goes out with it when an episode was open.
#[derive(Debug, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub booking_id: String,
    pub sender: String,
    pub receiver: String,
    pub content: String,
    pub stop_typing: bool,
}

/// One open booking conversation from the current user's point of view.
///
/// Owns the message log, the local typing machine and the remote typing
/// flag, and performs send validation and receiver resolution before
/// anything reaches the transport.
pub struct Conversation {
    parties: BookingParties,
    user_id: String,
    log: ChatLog,
    typing: TypingCoordinator,
    remote: RemoteTyping,
    history_loaded: bool,
}

impl Conversation {
    pub fn new(parties: BookingParties, user_id: String, quiet_period: Duration) -> Self {
        Self {
            parties,
            user_id,
            log: ChatLog::new(),
            typing: TypingCoordinator::new(quiet_period),
            remote: RemoteTyping::new(),
            history_loaded: false,
        }
    }

    pub fn booking_id(&self) -> &str {
        &self.parties.booking_id
    }

    /// Validates content and resolves the receiver. Fails fast without
    /// touching the transport; success closes any open typing episode.
    pub fn prepare_send(&mut self, content: &str) -> Result<OutgoingMessage, ChatError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::EmptyContent);
        }
        let receiver = self.parties.counterpart(&self.user_id)?.to_string();
        let stop_typing = self.typing.message_sent() == Some(TypingSignal::Stop);
        Ok(OutgoingMessage {
            booking_id: self.parties.booking_id.clone(),
            sender: self.user_id.clone(),
            receiver,
            content: content.to_string(),
            stop_typing,
        })
    }

    /// Records a local keystroke, returning the typing event to emit, if
    /// this keystroke opened an episode.
    pub fn keystroke(&mut self, now: Instant) -> Option<ClientEvent> {
        (self.typing.keystroke(now) == Some(TypingSignal::Start)).then(|| ClientEvent::Typing {
            booking_id: self.parties.booking_id.clone(),
            user_id: self.user_id.clone(),
        })
    }

    /// Checks the quiet-period deadline, returning the stop event to
    /// emit if the episode just expired.
    pub fn poll_typing(&mut self, now: Instant) -> Option<ClientEvent> {
        (self.typing.poll(now) == Some(TypingSignal::Stop)).then(|| ClientEvent::StopTyping {
            booking_id: self.parties.booking_id.clone(),
            user_id: self.user_id.clone(),
        })
    }

    pub fn typing_deadline(&self) -> Option<Instant> {
        self.typing.deadline()
    }

    /// Applies one inbound event to the view state. Events for other
    /// rooms or users are ignored.
    pub fn apply(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::History {
                booking_id,
                messages,
            } if *booking_id == self.parties.booking_id => {
                self.log.merge_history(messages.clone());
                self.history_loaded = true;
            }
            ServerEvent::NewMessage { message }
                if message.booking_id == self.parties.booking_id =>
            {
                self.log.merge(message.clone());
            }
            ServerEvent::UserTyping { user_id } if *user_id != self.user_id => {
                self.remote.started(user_id);
            }
            ServerEvent::UserStoppedTyping { user_id } => {
                self.remote.stopped(user_id);
            }
            _ => {}
        }
    }

    pub fn messages(&self) -> &[crate::protocol::ChatMessage] {
        self.log.messages()
    }

    /// Whether the initial history fetch has resolved; the chat view
    /// shows a loading state until it has.
    pub fn history_loaded(&self) -> bool {
        self.history_loaded
    }

    pub fn other_user_typing(&self) -> bool {
        self.remote.anyone_typing()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::protocol::ChatMessage;

    fn conversation(user_id: &str) -> Conversation {
        Conversation::new(
            BookingParties {
                booking_id: "b1".to_string(),
                customer_id: "u1".to_string(),
                vendor_id: "u2".to_string(),
            },
            user_id.to_string(),
            Duration::from_millis(1000),
        )
    }

    fn message(id: &str, sender: &str) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            booking_id: "b1".to_string(),
            sender: sender.to_string(),
            receiver: if sender == "u1" { "u2" } else { "u1" }.to_string(),
            content: "hello".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn send_resolves_counterpart_for_both_parties() {
        let mut by_customer = conversation("u1");
        let out = by_customer.prepare_send("hello").unwrap();
        assert_eq!(out.receiver, "u2");

        let mut by_vendor = conversation("u2");
        let out = by_vendor.prepare_send("hello").unwrap();
        assert_eq!(out.receiver, "u1");
    }

    #[test]
    fn send_rejects_empty_content_and_third_parties() {
        let mut convo = conversation("u1");
        assert!(matches!(
            convo.prepare_send("  \n "),
            Err(ChatError::EmptyContent)
        ));

        let mut intruder = conversation("u3");
        assert!(matches!(
            intruder.prepare_send("hi"),
            Err(ChatError::NoCounterpart { .. })
        ));
    }

    #[test]
    fn send_closes_an_open_typing_episode() {
        let mut convo = conversation("u1");
        let now = Instant::now();
        assert!(convo.keystroke(now).is_some());
        let out = convo.prepare_send("hello").unwrap();
        assert!(out.stop_typing);
        // No quiet-period stop afterwards.
        assert!(convo.poll_typing(now + Duration::from_millis(2000)).is_none());

        // Idle send carries no stop.
        let out = convo.prepare_send("again").unwrap();
        assert!(!out.stop_typing);
    }

    #[test]
    fn events_for_other_rooms_are_ignored() {
        let mut convo = conversation("u1");
        let mut foreign = message("m9", "u2");
        foreign.booking_id = "b2".to_string();
        convo.apply(&ServerEvent::NewMessage { message: foreign });
        assert!(convo.messages().is_empty());
    }

    #[test]
    fn history_and_live_events_merge_uniformly() {
        let mut convo = conversation("u1");
        // Live echo arrives before the history reply.
        convo.apply(&ServerEvent::NewMessage {
            message: message("m2", "u2"),
        });
        assert!(!convo.history_loaded());

        convo.apply(&ServerEvent::History {
            booking_id: "b1".to_string(),
            messages: vec![message("m1", "u1"), message("m2", "u2")],
        });
        assert!(convo.history_loaded());
        let ids: Vec<&str> = convo.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m2", "m1"]);
    }

    #[test]
    fn remote_typing_flag_tracks_signals() {
        let mut convo = conversation("u1");
        convo.apply(&ServerEvent::UserTyping {
            user_id: "u2".to_string(),
        });
        assert!(convo.other_user_typing());
        // Own echo never sets the flag.
        convo.apply(&ServerEvent::UserTyping {
            user_id: "u1".to_string(),
        });
        convo.apply(&ServerEvent::UserStoppedTyping {
            user_id: "u2".to_string(),
        });
        assert!(!convo.other_user_typing());
    }
}
