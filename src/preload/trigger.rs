//! Preload trigger evaluation
//!
//! Decides, from successive conversation snapshots, whether a new preload
//! should start. Deterministic: the same sequence of snapshots always yields
//! the same sequence of decisions.

use crate::domain::{Message, Role};

/// Which conversation change starts a preload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerPolicy {
    /// Fire when a User message appears after the latest one already seen.
    /// Anchoring on the last User id rather than counting window entries keeps
    /// this correct once the window is full and old messages are trimmed.
    #[default]
    NewUserMessage,
    /// Fire when the id of the latest message (any role) changes.
    LatestMessageChanged,
}

impl TriggerPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "new-user-message" | "user" => Some(TriggerPolicy::NewUserMessage),
            "latest-message" | "latest" => Some(TriggerPolicy::LatestMessageChanged),
            _ => None,
        }
    }
}

/// Remembers what the previous snapshots looked like, in constant space.
#[derive(Debug, Default)]
pub struct TriggerState {
    policy: TriggerPolicy,
    last_user_id: Option<String>,
    user_messages_seen: usize,
    latest_message_id: Option<String>,
}

impl TriggerState {
    pub fn new(policy: TriggerPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Record a snapshot and report whether it should trigger a preload.
    ///
    /// A conversation without any User message never triggers.
    ///
    /// User messages after the last one seen count as new. When that anchor is
    /// no longer in the snapshot, every User message in it does.
    pub fn observe(&mut self, messages: &[Message]) -> bool {
        let users: Vec<&Message> = messages.iter().filter(|m| m.role == Role::User).collect();
        let anchor = self
            .last_user_id
            .as_deref()
            .and_then(|last| users.iter().rposition(|m| m.id == last));
        let new_users = match anchor {
            Some(pos) => users.len() - pos - 1,
            None => users.len(),
        };
        if let Some(latest_user) = users.last().filter(|_| new_users > 0) {
            self.user_messages_seen += new_users;
            self.last_user_id = Some(latest_user.id.clone());
        }
        let new_user_message = new_users > 0;

        let latest = messages.last().map(|m| m.id.clone());
        let latest_changed = latest.is_some() && latest != self.latest_message_id;
        self.latest_message_id = latest;

        if self.user_messages_seen == 0 {
            return false;
        }

        match self.policy {
            TriggerPolicy::NewUserMessage => new_user_message,
            TriggerPolicy::LatestMessageChanged => latest_changed,
        }
    }

    pub fn user_messages_seen(&self) -> usize {
        self.user_messages_seen
    }
}
