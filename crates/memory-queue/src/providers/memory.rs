//! In-memory queue implementation.
//!
//! This module provides a queue that delivers messages within the same
//! process. It emulates a broker's delivery semantics:
//! - FIFO store with re-delivery at the tail on abandon
//! - Lock table with visibility timeouts and lock renewal
//! - Complete, abandon and dead-letter transitions
//! - A listen loop that pushes messages to a registered receiver
//!
//! Store and lock table sit behind one mutex, so two concurrent receives can
//! never take the same head. The guard is never held across an await point;
//! waiting receives park on a [`Notify`] woken by every send.

use super::{resolve_open_params, QueueReferences};
use crate::capabilities::MessagingCapabilities;
use crate::config::QueueConfig;
use crate::connection::{ConnectionResolver, CredentialResolver};
use crate::deadline::deadline_after;
use crate::error::{ConfigurationError, QueueError};
use crate::lock_table::LockTable;
use crate::message::{MessageEnvelope, QueueName, Timestamp};
use crate::metrics::{MetricsRecorder, QueueCounter};
use crate::queue::MessageQueue;
use crate::receiver::MessageReceiver;
use crate::store::MessageStore;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, trace};

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

// ============================================================================
// Internal State
// ============================================================================

/// Pending messages and in-flight locks, guarded together
#[derive(Debug)]
struct QueueState {
    store: MessageStore,
    locks: LockTable,
}

struct Inner {
    name: QueueName,
    config: QueueConfig,
    state: Mutex<QueueState>,
    /// Woken by every send and by close
    message_arrived: Notify,
    /// Woken by end_listen and close
    listen_cancelled: Notify,
    opened: AtomicBool,
    cancel: AtomicBool,
    metrics: Arc<dyn MetricsRecorder>,
    connection_resolver: Arc<dyn ConnectionResolver>,
    credential_resolver: Arc<dyn CredentialResolver>,
}

// ============================================================================
// MemoryMessageQueue
// ============================================================================

/// Message queue that sends and receives messages within the same process.
///
/// Clones share the same underlying queue.
///
/// ```rust
/// use memory_queue::{MemoryMessageQueue, MessageEnvelope, MessageQueue, QueueName};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let queue = MemoryMessageQueue::new(QueueName::new("orders".to_string())?);
/// queue.open().await?;
///
/// queue
///     .send(MessageEnvelope::from_string(None, "order", "ABC"))
///     .await?;
///
/// let mut message = queue.receive(Duration::from_secs(1)).await?.unwrap();
/// assert_eq!(message.message_as_string()?, "ABC");
/// queue.complete(&mut message).await?;
/// # Ok::<(), memory_queue::QueueError>(())
/// # }).unwrap();
/// ```
#[derive(Clone)]
pub struct MemoryMessageQueue {
    inner: Arc<Inner>,
}

impl MemoryMessageQueue {
    /// Create a queue with default configuration and no collaborators
    pub fn new(name: QueueName) -> Self {
        Self::build(name, QueueConfig::default(), QueueReferences::default())
    }

    /// Create a queue from configuration.
    ///
    /// A name set in `config` takes precedence over `name`.
    pub fn with_config(
        name: QueueName,
        config: QueueConfig,
        references: QueueReferences,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let name = config.resolve_name(&name)?;
        Ok(Self::build(name, config, references))
    }

    fn build(name: QueueName, config: QueueConfig, references: QueueReferences) -> Self {
        let connection_resolver = references.connection_resolver(&config);
        let credential_resolver = references.credential_resolver(&config);

        Self {
            inner: Arc::new(Inner {
                name,
                metrics: references.metrics(),
                connection_resolver,
                credential_resolver,
                config,
                state: Mutex::new(QueueState {
                    store: MessageStore::new(),
                    locks: LockTable::new(),
                }),
                message_arrived: Notify::new(),
                listen_cancelled: Notify::new(),
                opened: AtomicBool::new(false),
                cancel: AtomicBool::new(false),
            }),
        }
    }

    /// Configuration the queue was built with
    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Number of received messages still holding a lock
    pub fn locked_message_count(&self) -> Result<usize, QueueError> {
        Ok(self.state()?.locks.len())
    }

    /// Receive with a lock duration independent of the wait.
    ///
    /// [`MessageQueue::receive`] uses its wait timeout as the lock duration
    /// as well.
    pub async fn receive_with_lock(
        &self,
        wait_timeout: Duration,
        lock_duration: Duration,
    ) -> Result<Option<MessageEnvelope>, QueueError> {
        self.check_open()?;
        self.wait_and_receive(wait_timeout, lock_duration, false)
            .await
    }

    /// Start the listen loop on a background task.
    ///
    /// Cancellation is reset before the task is spawned, so an `end_listen`
    /// issued right after this call is not lost.
    pub fn begin_listen(&self, receiver: Arc<dyn MessageReceiver>) -> JoinHandle<()> {
        self.inner.cancel.store(false, Ordering::SeqCst);
        let queue = self.clone();

        tokio::spawn(async move {
            if let Err(e) = queue.run_listen_loop(receiver).await {
                error!(queue = %queue.inner.name, error = %e, "Listen loop failed to start");
            }
        })
    }

    fn state(&self) -> Result<MutexGuard<'_, QueueState>, QueueError> {
        self.inner.state.lock().map_err(QueueError::poisoned)
    }

    fn check_open(&self) -> Result<(), QueueError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(QueueError::not_opened(self.inner.name.as_str()))
        }
    }

    fn is_cancelled(&self) -> bool {
        self.inner.cancel.load(Ordering::SeqCst)
    }

    /// Stamp and append an envelope, then wake waiting receivers
    fn enqueue(&self, mut envelope: MessageEnvelope) -> Result<(), QueueError> {
        envelope.set_sent_time(Timestamp::now());
        envelope.set_lock_token(None);

        debug!(
            queue = %self.inner.name,
            correlation_id = envelope.correlation_id().unwrap_or_default(),
            message_id = %envelope.message_id(),
            "Sent message {}",
            envelope
        );

        self.state()?.store.push_back(envelope);
        self.inner
            .metrics
            .increment(&self.inner.name, QueueCounter::SentMessages);
        self.inner.message_arrived.notify_waiters();

        Ok(())
    }

    /// Take and lock the head of the store, if any
    fn try_receive(&self, lock_duration: Duration) -> Result<Option<MessageEnvelope>, QueueError> {
        let envelope = {
            let mut state = self.state()?;
            match state.store.pop_front() {
                Some(envelope) => state.locks.lock(envelope, lock_duration, Instant::now()),
                None => return Ok(None),
            }
        };

        self.inner
            .metrics
            .increment(&self.inner.name, QueueCounter::ReceivedMessages);
        debug!(
            queue = %self.inner.name,
            correlation_id = envelope.correlation_id().unwrap_or_default(),
            lock_token = ?envelope.lock_token(),
            "Received message {}",
            envelope
        );

        Ok(Some(envelope))
    }

    /// Put a received message back at the head of the store, unlocked.
    ///
    /// Unlike `abandon` this is not a new send: the sent counter and sent
    /// time are left alone. Does nothing when the lock is already gone.
    fn return_to_head(&self, envelope: &mut MessageEnvelope) -> Result<(), QueueError> {
        let Some(token) = envelope.lock_token() else {
            return Ok(());
        };
        envelope.set_lock_token(None);

        {
            let mut state = self.state()?;
            let Some(locked) = state.locks.remove(token) else {
                return Ok(());
            };

            let mut returned = locked.envelope;
            returned.set_lock_token(None);
            state.store.push_front(returned);
        }

        trace!(
            queue = %self.inner.name,
            correlation_id = envelope.correlation_id().unwrap_or_default(),
            "Returned message {} to {}",
            envelope,
            self
        );
        self.inner.message_arrived.notify_waiters();

        Ok(())
    }

    /// Receive, waiting up to `wait_timeout` in total.
    ///
    /// Wakes on every send and at least every `receive_check_interval`. A
    /// closed queue ends the wait; so does cancellation when
    /// `observe_cancel` is set.
    async fn wait_and_receive(
        &self,
        wait_timeout: Duration,
        lock_duration: Duration,
        observe_cancel: bool,
    ) -> Result<Option<MessageEnvelope>, QueueError> {
        let deadline = deadline_after(Instant::now(), wait_timeout);
        let check_interval = self.inner.config.receive_check_interval();

        loop {
            let arrived = self.inner.message_arrived.notified();
            tokio::pin!(arrived);
            arrived.as_mut().enable();

            if let Some(envelope) = self.try_receive(lock_duration)? {
                return Ok(Some(envelope));
            }

            if !self.is_open() || (observe_cancel && self.is_cancelled()) {
                return Ok(None);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            let wake_at = deadline_after(now, check_interval).min(deadline);
            let _ = tokio::time::timeout_at(wake_at, arrived).await;
        }
    }

    /// Sleep for `duration` unless listening is cancelled first
    async fn pause_listening(&self, duration: Duration) {
        let cancelled = self.inner.listen_cancelled.notified();
        tokio::pin!(cancelled);
        cancelled.as_mut().enable();

        if self.is_cancelled() {
            return;
        }

        let _ = tokio::time::timeout(duration, cancelled).await;
    }

    async fn run_listen_loop(&self, receiver: Arc<dyn MessageReceiver>) -> Result<(), QueueError> {
        self.check_open()?;

        let interval = self.inner.config.listen_interval();
        trace!(queue = %self.inner.name, "Started listening messages at {}", self);

        while !self.is_cancelled() {
            match self.wait_and_receive(interval, interval, true).await {
                Ok(Some(mut envelope)) => {
                    if self.is_cancelled() {
                        if let Err(e) = self.return_to_head(&mut envelope) {
                            debug!(queue = %self.inner.name, error = %e, "Could not return message after cancellation");
                        }
                        break;
                    }

                    if let Err(e) = receiver.receive_message(&mut envelope, self).await {
                        error!(
                            queue = %self.inner.name,
                            correlation_id = envelope.correlation_id().unwrap_or_default(),
                            error = %e,
                            "Failed to process the message"
                        );
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    error!(queue = %self.inner.name, error = %e, "Failed to receive the message");
                }
            }

            self.pause_listening(interval).await;
        }

        trace!(queue = %self.inner.name, "Stopped listening messages at {}", self);
        Ok(())
    }
}

impl std::fmt::Display for MemoryMessageQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.inner.name)
    }
}

impl std::fmt::Debug for MemoryMessageQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryMessageQueue")
            .field("name", &self.inner.name)
            .field("opened", &self.is_open())
            .finish()
    }
}

#[async_trait]
impl MessageQueue for MemoryMessageQueue {
    fn name(&self) -> &QueueName {
        &self.inner.name
    }

    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities::memory()
    }

    fn is_open(&self) -> bool {
        self.inner.opened.load(Ordering::SeqCst)
    }

    async fn open(&self) -> Result<(), QueueError> {
        if self.is_open() {
            return Ok(());
        }

        resolve_open_params(
            &self.inner.name,
            self.inner.connection_resolver.as_ref(),
            self.inner.credential_resolver.as_ref(),
        )
        .await?;

        self.inner.opened.store(true, Ordering::SeqCst);
        debug!(queue = %self.inner.name, "Opened queue {}", self);
        Ok(())
    }

    async fn close(&self) -> Result<(), QueueError> {
        self.inner.opened.store(false, Ordering::SeqCst);
        self.inner.cancel.store(true, Ordering::SeqCst);
        self.inner.message_arrived.notify_waiters();
        self.inner.listen_cancelled.notify_waiters();

        trace!(queue = %self.inner.name, "Closed queue {}", self);
        Ok(())
    }

    async fn clear(&self) -> Result<(), QueueError> {
        {
            let mut state = self.state()?;
            state.store.clear();
            state.locks.clear();
        }
        self.inner.cancel.store(false, Ordering::SeqCst);

        trace!(queue = %self.inner.name, "Cleared queue {}", self);
        Ok(())
    }

    async fn read_message_count(&self) -> Result<usize, QueueError> {
        self.check_open()?;
        Ok(self.state()?.store.len())
    }

    async fn send(&self, envelope: MessageEnvelope) -> Result<(), QueueError> {
        self.check_open()?;
        self.enqueue(envelope)
    }

    async fn peek(&self) -> Result<Option<MessageEnvelope>, QueueError> {
        self.check_open()?;

        let message = self.state()?.store.front().cloned();
        if let Some(message) = &message {
            trace!(
                queue = %self.inner.name,
                correlation_id = message.correlation_id().unwrap_or_default(),
                "Peeked message {} on {}",
                message,
                self
            );
        }

        Ok(message)
    }

    async fn peek_batch(&self, count: usize) -> Result<Vec<MessageEnvelope>, QueueError> {
        self.check_open()?;

        let messages = self.state()?.store.head(count);
        trace!(queue = %self.inner.name, "Peeked {} messages on {}", messages.len(), self);

        Ok(messages)
    }

    async fn receive(
        &self,
        wait_timeout: Duration,
    ) -> Result<Option<MessageEnvelope>, QueueError> {
        self.receive_with_lock(wait_timeout, wait_timeout).await
    }

    async fn renew_lock(
        &self,
        envelope: &MessageEnvelope,
        lock_timeout: Duration,
    ) -> Result<(), QueueError> {
        self.check_open()?;

        let Some(token) = envelope.lock_token() else {
            return Ok(());
        };

        let renewed = self
            .state()?
            .locks
            .renew(token, lock_timeout, Instant::now());

        trace!(
            queue = %self.inner.name,
            correlation_id = envelope.correlation_id().unwrap_or_default(),
            lock_token = %token,
            renewed,
            "Renewed lock for message {} at {}",
            envelope,
            self
        );

        Ok(())
    }

    async fn complete(&self, envelope: &mut MessageEnvelope) -> Result<(), QueueError> {
        self.check_open()?;

        let Some(token) = envelope.lock_token() else {
            return Ok(());
        };

        self.state()?.locks.remove(token);
        envelope.set_lock_token(None);

        trace!(
            queue = %self.inner.name,
            correlation_id = envelope.correlation_id().unwrap_or_default(),
            "Completed message {} at {}",
            envelope,
            self
        );

        Ok(())
    }

    async fn abandon(&self, envelope: &mut MessageEnvelope) -> Result<(), QueueError> {
        self.check_open()?;

        let Some(token) = envelope.lock_token() else {
            return Ok(());
        };

        let locked = self.state()?.locks.remove(token);
        envelope.set_lock_token(None);

        let Some(locked) = locked else {
            return Ok(());
        };

        // An expired lock counts as already returned; re-sending would
        // open a second delivery path for the same message.
        if locked.is_expired(Instant::now()) {
            trace!(
                queue = %self.inner.name,
                correlation_id = envelope.correlation_id().unwrap_or_default(),
                "Skipped abandoning expired message {} at {}",
                envelope,
                self
            );
            return Ok(());
        }

        trace!(
            queue = %self.inner.name,
            correlation_id = envelope.correlation_id().unwrap_or_default(),
            "Abandoned message {} at {}",
            envelope,
            self
        );

        self.enqueue(locked.envelope)
    }

    async fn move_to_dead_letter(&self, envelope: &mut MessageEnvelope) -> Result<(), QueueError> {
        self.check_open()?;

        let Some(token) = envelope.lock_token() else {
            return Ok(());
        };

        self.state()?.locks.remove(token);
        envelope.set_lock_token(None);

        self.inner
            .metrics
            .increment(&self.inner.name, QueueCounter::DeadMessages);
        trace!(
            queue = %self.inner.name,
            correlation_id = envelope.correlation_id().unwrap_or_default(),
            "Moved to dead message {} at {}",
            envelope,
            self
        );

        Ok(())
    }

    async fn listen(&self, receiver: Arc<dyn MessageReceiver>) -> Result<(), QueueError> {
        self.inner.cancel.store(false, Ordering::SeqCst);
        self.run_listen_loop(receiver).await
    }

    fn end_listen(&self) {
        self.inner.cancel.store(true, Ordering::SeqCst);
        self.inner.listen_cancelled.notify_waiters();
        self.inner.message_arrived.notify_waiters();
    }
}
