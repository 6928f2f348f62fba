//! FIFO store of envelopes waiting for delivery.

use crate::message::MessageEnvelope;
use std::collections::VecDeque;

/// Ordered sequence of pending envelopes.
///
/// Insertion order is preserved. Re-deliveries are appended at the tail like
/// any other send, so an abandoned message queues behind what is already
/// waiting. Only a delivery that never reached a consumer goes back to the
/// head.
#[derive(Debug, Default)]
pub(crate) struct MessageStore {
    messages: VecDeque<MessageEnvelope>,
}

impl MessageStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_back(&mut self, envelope: MessageEnvelope) {
        self.messages.push_back(envelope);
    }

    pub(crate) fn push_front(&mut self, envelope: MessageEnvelope) {
        self.messages.push_front(envelope);
    }

    pub(crate) fn pop_front(&mut self) -> Option<MessageEnvelope> {
        self.messages.pop_front()
    }

    pub(crate) fn front(&self) -> Option<&MessageEnvelope> {
        self.messages.front()
    }

    /// Clones of up to `count` leading envelopes, in order
    pub(crate) fn head(&self, count: usize) -> Vec<MessageEnvelope> {
        self.messages.iter().take(count).cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.messages.len()
    }

    pub(crate) fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
