//! Bounded conversation window
//!
//! Keeps the last N messages in insertion order. Order matters: it defines
//! which message is the "latest" of each role.

use std::collections::VecDeque;

use crate::domain::Message;

/// Default number of messages kept and forwarded to the ad server.
pub const DEFAULT_MESSAGE_WINDOW: usize = 10;

/// Ordered window of the most recent messages.
///
/// Not synchronized; the owning session serializes access.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    messages: VecDeque<Message>,
    capacity: usize,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(DEFAULT_MESSAGE_WINDOW)
    }
}

impl ConversationStore {
    /// A zero capacity is bumped to one so the window can hold the latest message.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            messages: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Replace the window, keeping only the last N messages.
    pub fn set_messages(&mut self, messages: Vec<Message>) {
        let skip = messages.len().saturating_sub(self.capacity);
        self.messages = messages.into_iter().skip(skip).collect();
    }

    /// Add one message and drop the oldest ones past capacity.
    pub fn append(&mut self, message: Message) {
        self.messages.push_back(message);
        while self.messages.len() > self.capacity {
            self.messages.pop_front();
        }
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
