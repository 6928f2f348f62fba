//! The message queue interface shared by every queue implementation.

use crate::capabilities::MessagingCapabilities;
use crate::error::QueueError;
use crate::message::{MessageEnvelope, QueueName};
use crate::receiver::MessageReceiver;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Main interface for queue operations across all implementations.
///
/// Operations invoked before `open` (or after `close`) fail with
/// [`QueueError::NotOpened`]. Completing, abandoning, renewing or
/// dead-lettering an envelope that holds no lock is a successful no-op so
/// double acknowledgement is tolerated.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Name of the queue
    fn name(&self) -> &QueueName;

    /// Advisory description of the supported operations
    fn capabilities(&self) -> MessagingCapabilities;

    /// Check if the queue has been opened
    fn is_open(&self) -> bool;

    /// Resolve connection and credentials, then mark the queue usable
    async fn open(&self) -> Result<(), QueueError>;

    /// Cancel listening and mark the queue unusable
    async fn close(&self) -> Result<(), QueueError>;

    /// Drop every pending and in-flight message
    async fn clear(&self) -> Result<(), QueueError>;

    /// Number of messages waiting for delivery; in-flight messages are excluded
    async fn read_message_count(&self) -> Result<usize, QueueError>;

    /// Append an envelope to the queue
    async fn send(&self, envelope: MessageEnvelope) -> Result<(), QueueError>;

    /// Build an envelope from a serializable value and send it
    async fn send_as_object<T>(
        &self,
        correlation_id: Option<String>,
        message_type: &str,
        value: &T,
    ) -> Result<(), QueueError>
    where
        T: Serialize + Sync + ?Sized,
        Self: Sized,
    {
        let envelope = MessageEnvelope::from_json(correlation_id, message_type, value)?;
        self.send(envelope).await
    }

    /// Head of the queue without removing it
    async fn peek(&self) -> Result<Option<MessageEnvelope>, QueueError>;

    /// Up to `count` leading messages without removing them
    async fn peek_batch(&self, count: usize) -> Result<Vec<MessageEnvelope>, QueueError>;

    /// Remove and lock the head of the queue, waiting up to `wait_timeout`
    /// for one to arrive. Returns `Ok(None)` when nothing arrived in time.
    async fn receive(&self, wait_timeout: Duration)
        -> Result<Option<MessageEnvelope>, QueueError>;

    /// Extend the lock held by `envelope`
    async fn renew_lock(
        &self,
        envelope: &MessageEnvelope,
        lock_timeout: Duration,
    ) -> Result<(), QueueError>;

    /// Permanently retire a received message
    async fn complete(&self, envelope: &mut MessageEnvelope) -> Result<(), QueueError>;

    /// Release a received message for re-delivery
    async fn abandon(&self, envelope: &mut MessageEnvelope) -> Result<(), QueueError>;

    /// Permanently discard a received message as unprocessable
    async fn move_to_dead_letter(&self, envelope: &mut MessageEnvelope) -> Result<(), QueueError>;

    /// Deliver messages to `receiver` until [`end_listen`](Self::end_listen)
    async fn listen(&self, receiver: Arc<dyn MessageReceiver>) -> Result<(), QueueError>;

    /// Stop the current listen loop
    fn end_listen(&self);
}
