use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Signal to put on the wire when the local typing state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingSignal {
    Start,
    Stop,
}

/// Local typing state machine: Idle -> Typing -> Idle.
///
/// The first keystroke of an episode emits Start; further keystrokes
/// only push the quiet-period deadline out. The episode ends with a
/// single Stop, either when a message is sent or when the quiet period
/// elapses, whichever comes first.
///
/// The clock is passed in by the caller, so the machine itself has no
/// timers; a driver polls `poll` with the current instant (or sleeps
/// until `deadline`).
#[derive(Debug)]
pub struct TypingCoordinator {
    quiet_period: Duration,
    deadline: Option<Instant>,
}

impl TypingCoordinator {
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            deadline: None,
        }
    }

    pub fn is_typing(&self) -> bool {
        self.deadline.is_some()
    }

    /// When the current episode will auto-expire, if one is open.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Records a local keystroke. Emits Start only on Idle -> Typing.
    pub fn keystroke(&mut self, now: Instant) -> Option<TypingSignal> {
        let was_idle = self.deadline.is_none();
        self.deadline = Some(now + self.quiet_period);
        was_idle.then_some(TypingSignal::Start)
    }

    /// A message was sent: force the episode closed.
    pub fn message_sent(&mut self) -> Option<TypingSignal> {
        self.deadline.take().map(|_| TypingSignal::Stop)
    }

    /// Checks the quiet-period deadline. Emits Stop at most once per
    /// episode, when the deadline has lapsed.
    pub fn poll(&mut self, now: Instant) -> Option<TypingSignal> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                Some(TypingSignal::Stop)
            }
            _ => None,
        }
    }
}

/// Remote side of the presence picture: which other users are typing.
///
/// Typing signals carry no id, so there is nothing to dedup; the flag
/// is simply set and cleared, which makes duplicate signals harmless.
/// A lost stop signal leaves the flag set until the user leaves the
/// room, mirroring the wire contract.
#[derive(Debug, Default)]
pub struct RemoteTyping {
    users: HashSet<String>,
}

impl RemoteTyping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn started(&mut self, user_id: &str) {
        self.users.insert(user_id.to_string());
    }

    pub fn stopped(&mut self, user_id: &str) {
        self.users.remove(user_id);
    }

    pub fn is_typing(&self, user_id: &str) -> bool {
        self.users.contains(user_id)
    }

    pub fn anyone_typing(&self) -> bool {
        !self.users.is_empty()
    }
}
