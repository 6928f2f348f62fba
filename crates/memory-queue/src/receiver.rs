//! Receivers that consume messages pushed by a listen loop.

use crate::deadline::deadline_after;
use crate::message::MessageEnvelope;
use crate::queue::MessageQueue;
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

/// Consumer of messages delivered by [`MessageQueue::listen`].
///
/// The receiver gets the queue the message came from so it can complete,
/// abandon or dead-letter it. Errors are logged by the listen loop and never
/// stop it.
#[async_trait]
pub trait MessageReceiver: Send + Sync {
    async fn receive_message(
        &self,
        envelope: &mut MessageEnvelope,
        queue: &dyn MessageQueue,
    ) -> anyhow::Result<()>;
}

/// Receiver wrapping a plain callback
pub struct CallbackMessageReceiver<F> {
    callback: F,
}

impl<F> CallbackMessageReceiver<F>
where
    F: Fn(&MessageEnvelope) -> anyhow::Result<()> + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

#[async_trait]
impl<F> MessageReceiver for CallbackMessageReceiver<F>
where
    F: Fn(&MessageEnvelope) -> anyhow::Result<()> + Send + Sync,
{
    async fn receive_message(
        &self,
        envelope: &mut MessageEnvelope,
        _queue: &dyn MessageQueue,
    ) -> anyhow::Result<()> {
        (self.callback)(envelope)
    }
}

/// Receiver that records every message it is given
#[derive(Debug, Default)]
pub struct TestMessageReceiver {
    messages: Mutex<Vec<MessageEnvelope>>,
    arrived: Notify,
}

impl TestMessageReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies of the received messages, in arrival order
    pub fn messages(&self) -> Vec<MessageEnvelope> {
        self.messages
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }

    pub fn message_count(&self) -> usize {
        self.messages
            .lock()
            .map(|messages| messages.len())
            .unwrap_or(0)
    }

    /// Forget every received message
    pub fn clear(&self) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.clear();
        }
    }

    /// Wait until at least `count` messages have arrived or `timeout` passes.
    ///
    /// Returns whether the count was reached.
    pub async fn wait_for_messages(&self, count: usize, timeout: Duration) -> bool {
        let deadline = deadline_after(tokio::time::Instant::now(), timeout);

        loop {
            let arrived = self.arrived.notified();
            tokio::pin!(arrived);
            arrived.as_mut().enable();

            if self.message_count() >= count {
                return true;
            }

            if tokio::time::timeout_at(deadline, arrived).await.is_err() {
                return self.message_count() >= count;
            }
        }
    }
}

#[async_trait]
impl MessageReceiver for TestMessageReceiver {
    async fn receive_message(
        &self,
        envelope: &mut MessageEnvelope,
        _queue: &dyn MessageQueue,
    ) -> anyhow::Result<()> {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(envelope.clone());
        }
        self.arrived.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
#[path = "receiver_tests.rs"]
mod tests;
