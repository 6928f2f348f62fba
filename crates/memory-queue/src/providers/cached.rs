//! Queue with a local buffer in front of a push-subscription broker.
//!
//! Brokers that push messages to subscribers (topics, streams) cannot be
//! polled. [`CachedMessageQueue`] subscribes to such a broker and keeps the
//! pushed messages in a local buffer so `peek`, `peek_batch`, `receive` and
//! `read_message_count` work as they do for a pull queue. While a listener
//! is registered the pump task hands every delivery to it, oldest first.
//! The pump is the only task that calls the listener, so a listener may
//! call back into the queue, `listen` included.
//!
//! Subscription is lazy: the first `listen`, `peek`, `peek_batch` or
//! `receive` subscribes, unless `auto_subscribe` is configured, in which case
//! `open` does.

use super::{resolve_open_params, QueueReferences};
use crate::capabilities::MessagingCapabilities;
use crate::config::QueueConfig;
use crate::connection::{ConnectionResolver, CredentialResolver};
use crate::deadline::deadline_after;
use crate::error::{ConfigurationError, QueueError};
use crate::message::{MessageEnvelope, QueueName, Timestamp};
use crate::metrics::{MetricsRecorder, QueueCounter};
use crate::queue::MessageQueue;
use crate::receiver::MessageReceiver;
use crate::store::MessageStore;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, trace, warn};

#[cfg(test)]
#[path = "cached_tests.rs"]
mod tests;

// ============================================================================
// Broker Interface
// ============================================================================

/// Handle a broker pushes deliveries into
#[derive(Debug, Clone)]
pub struct DeliverySink {
    queue_name: QueueName,
    sender: mpsc::UnboundedSender<MessageEnvelope>,
}

impl DeliverySink {
    pub fn new(queue_name: QueueName, sender: mpsc::UnboundedSender<MessageEnvelope>) -> Self {
        Self { queue_name, sender }
    }

    /// Name of the subscribed queue
    pub fn queue_name(&self) -> &QueueName {
        &self.queue_name
    }

    /// Push one envelope to the subscriber.
    ///
    /// Fails once the subscriber has gone away.
    pub fn deliver(&self, envelope: MessageEnvelope) -> Result<(), QueueError> {
        self.sender
            .send(envelope)
            .map_err(|_| QueueError::Subscription {
                queue_name: self.queue_name.to_string(),
                message: "subscriber is no longer receiving".to_string(),
            })
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// A broker that pushes messages to one subscriber.
///
/// Lock transitions default to no-ops: most push brokers acknowledge on
/// delivery.
#[async_trait]
pub trait PushBroker: Send + Sync + 'static {
    /// Start pushing messages into `sink`
    async fn subscribe(&self, sink: DeliverySink) -> Result<(), QueueError>;

    /// Stop pushing messages
    async fn unsubscribe(&self) -> Result<(), QueueError>;

    /// Hand a message to the broker for delivery
    async fn publish(&self, envelope: MessageEnvelope) -> Result<(), QueueError>;

    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities::push_only()
    }

    async fn renew_lock(
        &self,
        _envelope: &MessageEnvelope,
        _lock_timeout: Duration,
    ) -> Result<(), QueueError> {
        Ok(())
    }

    async fn complete(&self, _envelope: &mut MessageEnvelope) -> Result<(), QueueError> {
        Ok(())
    }

    async fn abandon(&self, _envelope: &mut MessageEnvelope) -> Result<(), QueueError> {
        Ok(())
    }

    async fn move_to_dead_letter(&self, _envelope: &mut MessageEnvelope) -> Result<(), QueueError> {
        Ok(())
    }
}

// ============================================================================
// CachedMessageQueue
// ============================================================================

struct CachedInner<B> {
    name: QueueName,
    config: QueueConfig,
    broker: B,
    buffer: Mutex<MessageStore>,
    receiver: Mutex<Option<Arc<dyn MessageReceiver>>>,
    /// Asks the pump to hand buffered messages to a new listener
    drain_requested: Arc<Notify>,
    /// Pump task of the active subscription
    subscription: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    opened: AtomicBool,
    message_arrived: Notify,
    metrics: Arc<dyn MetricsRecorder>,
    connection_resolver: Arc<dyn ConnectionResolver>,
    credential_resolver: Arc<dyn CredentialResolver>,
}

/// Pull-style queue over a [`PushBroker`].
///
/// Clones share the same buffer and subscription.
pub struct CachedMessageQueue<B: PushBroker> {
    inner: Arc<CachedInner<B>>,
}

impl<B: PushBroker> Clone for CachedMessageQueue<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: PushBroker> CachedMessageQueue<B> {
    pub fn new(name: QueueName, broker: B) -> Self {
        Self::build(
            name,
            broker,
            QueueConfig::default(),
            QueueReferences::default(),
        )
    }

    /// Create a queue from configuration.
    ///
    /// A name set in `config` takes precedence over `name`.
    pub fn with_config(
        name: QueueName,
        broker: B,
        config: QueueConfig,
        references: QueueReferences,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let name = config.resolve_name(&name)?;
        Ok(Self::build(name, broker, config, references))
    }

    fn build(name: QueueName, broker: B, config: QueueConfig, references: QueueReferences) -> Self {
        let connection_resolver = references.connection_resolver(&config);
        let credential_resolver = references.credential_resolver(&config);

        Self {
            inner: Arc::new(CachedInner {
                name,
                broker,
                metrics: references.metrics(),
                connection_resolver,
                credential_resolver,
                config,
                buffer: Mutex::new(MessageStore::new()),
                receiver: Mutex::new(None),
                drain_requested: Arc::new(Notify::new()),
                subscription: tokio::sync::Mutex::new(None),
                opened: AtomicBool::new(false),
                message_arrived: Notify::new(),
            }),
        }
    }

    /// Broker the queue is subscribed through
    pub fn broker(&self) -> &B {
        &self.inner.broker
    }

    /// Configuration the queue was built with
    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Whether a broker subscription is active
    pub async fn is_subscribed(&self) -> bool {
        self.inner.subscription.lock().await.is_some()
    }

    /// Whether a listener is registered
    pub fn is_listening(&self) -> bool {
        self.receiver_slot()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    fn buffer(&self) -> Result<MutexGuard<'_, MessageStore>, QueueError> {
        self.inner.buffer.lock().map_err(QueueError::poisoned)
    }

    fn receiver_slot(&self) -> Result<MutexGuard<'_, Option<Arc<dyn MessageReceiver>>>, QueueError> {
        self.inner.receiver.lock().map_err(QueueError::poisoned)
    }

    fn check_open(&self) -> Result<(), QueueError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(QueueError::not_opened(self.inner.name.as_str()))
        }
    }

    /// Subscribe to the broker unless already subscribed
    async fn subscribe(&self) -> Result<(), QueueError> {
        let mut subscription = self.inner.subscription.lock().await;
        if subscription.is_some() {
            return Ok(());
        }

        let (sender, deliveries) = mpsc::unbounded_channel();
        self.inner
            .broker
            .subscribe(DeliverySink::new(self.inner.name.clone(), sender))
            .await?;

        let queue = Arc::downgrade(&self.inner);
        let drain_requested = Arc::clone(&self.inner.drain_requested);
        *subscription = Some(tokio::spawn(Self::pump(queue, drain_requested, deliveries)));

        debug!(queue = %self.inner.name, "Subscribed to broker");
        Ok(())
    }

    /// Drop the broker subscription and stop the pump
    async fn unsubscribe(&self) -> Result<(), QueueError> {
        let Some(pump) = self.inner.subscription.lock().await.take() else {
            return Ok(());
        };

        let result = self.inner.broker.unsubscribe().await;
        pump.abort();

        debug!(queue = %self.inner.name, "Unsubscribed from broker");
        result
    }

    /// Route every delivery, and every drain request, until the
    /// subscription ends or the queue is dropped
    async fn pump(
        queue: Weak<CachedInner<B>>,
        drain_requested: Arc<Notify>,
        mut deliveries: mpsc::UnboundedReceiver<MessageEnvelope>,
    ) {
        loop {
            let delivery = tokio::select! {
                delivery = deliveries.recv() => match delivery {
                    Some(envelope) => Some(envelope),
                    None => break,
                },
                _ = drain_requested.notified() => None,
            };

            let Some(inner) = queue.upgrade() else {
                break;
            };

            let queue = CachedMessageQueue { inner };
            if let Err(e) = queue.on_message(delivery).await {
                error!(queue = %queue.inner.name, error = %e, "Failed to route the message");
            }
        }
    }

    /// Buffer a delivery, then hand the buffer to the listener if one is
    /// registered.
    ///
    /// No lock is held while the listener runs.
    async fn on_message(&self, delivery: Option<MessageEnvelope>) -> Result<(), QueueError> {
        if let Some(envelope) = delivery {
            trace!(
                queue = %self.inner.name,
                correlation_id = envelope.correlation_id().unwrap_or_default(),
                "Received message {} via {}",
                envelope,
                self
            );
            self.buffer()?.push_back(envelope);
        }

        loop {
            let receiver = self.receiver_slot()?.clone();
            let Some(receiver) = receiver else {
                self.inner.message_arrived.notify_waiters();
                return Ok(());
            };

            let envelope = self.buffer()?.pop_front();
            let Some(envelope) = envelope else {
                return Ok(());
            };

            self.send_message_to_receiver(receiver.as_ref(), envelope)
                .await;
        }
    }

    async fn send_message_to_receiver(
        &self,
        receiver: &dyn MessageReceiver,
        mut envelope: MessageEnvelope,
    ) {
        self.inner
            .metrics
            .increment(&self.inner.name, QueueCounter::ReceivedMessages);

        if let Err(e) = receiver.receive_message(&mut envelope, self).await {
            error!(
                queue = %self.inner.name,
                correlation_id = envelope.correlation_id().unwrap_or_default(),
                error = %e,
                "Failed to process the message"
            );
        }
    }

    fn take_buffered(&self) -> Result<Option<MessageEnvelope>, QueueError> {
        let message = self.buffer()?.pop_front();
        if let Some(message) = &message {
            self.inner
                .metrics
                .increment(&self.inner.name, QueueCounter::ReceivedMessages);
            debug!(
                queue = %self.inner.name,
                correlation_id = message.correlation_id().unwrap_or_default(),
                "Received message {}",
                message
            );
        }
        Ok(message)
    }
}

impl<B: PushBroker> std::fmt::Display for CachedMessageQueue<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.inner.name)
    }
}

impl<B: PushBroker> std::fmt::Debug for CachedMessageQueue<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedMessageQueue")
            .field("name", &self.inner.name)
            .field("opened", &self.is_open())
            .finish()
    }
}

#[async_trait]
impl<B: PushBroker> MessageQueue for CachedMessageQueue<B> {
    fn name(&self) -> &QueueName {
        &self.inner.name
    }

    fn capabilities(&self) -> MessagingCapabilities {
        self.inner.broker.capabilities().with_local_buffer()
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

        if self.inner.config.auto_subscribe {
            self.subscribe().await?;
        }

        self.inner.opened.store(true, Ordering::SeqCst);
        debug!(queue = %self.inner.name, "Opened queue {}", self);
        Ok(())
    }

    async fn close(&self) -> Result<(), QueueError> {
        if !self.is_open() {
            return Ok(());
        }

        self.inner.opened.store(false, Ordering::SeqCst);
        let result = self.unsubscribe().await;

        self.buffer()?.clear();
        *self.receiver_slot()? = None;
        self.inner.message_arrived.notify_waiters();

        trace!(queue = %self.inner.name, "Closed queue {}", self);
        result
    }

    async fn clear(&self) -> Result<(), QueueError> {
        self.buffer()?.clear();
        trace!(queue = %self.inner.name, "Cleared queue {}", self);
        Ok(())
    }

    async fn read_message_count(&self) -> Result<usize, QueueError> {
        self.check_open()?;
        Ok(self.buffer()?.len())
    }

    async fn send(&self, mut envelope: MessageEnvelope) -> Result<(), QueueError> {
        self.check_open()?;

        envelope.set_sent_time(Timestamp::now());
        debug!(
            queue = %self.inner.name,
            correlation_id = envelope.correlation_id().unwrap_or_default(),
            "Sent message {}",
            envelope
        );

        self.inner.broker.publish(envelope).await?;
        self.inner
            .metrics
            .increment(&self.inner.name, QueueCounter::SentMessages);
        Ok(())
    }

    async fn peek(&self) -> Result<Option<MessageEnvelope>, QueueError> {
        self.check_open()?;
        self.subscribe().await?;

        let message = self.buffer()?.front().cloned();
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
        self.subscribe().await?;

        let messages = self.buffer()?.head(count);
        trace!(queue = %self.inner.name, "Peeked {} messages on {}", messages.len(), self);

        Ok(messages)
    }

    async fn receive(
        &self,
        wait_timeout: Duration,
    ) -> Result<Option<MessageEnvelope>, QueueError> {
        self.check_open()?;
        self.subscribe().await?;

        let deadline = deadline_after(Instant::now(), wait_timeout);
        let check_interval = self.inner.config.receive_check_interval();

        loop {
            let arrived = self.inner.message_arrived.notified();
            tokio::pin!(arrived);
            arrived.as_mut().enable();

            if let Some(message) = self.take_buffered()? {
                return Ok(Some(message));
            }

            let now = Instant::now();
            if !self.is_open() || now >= deadline {
                return Ok(None);
            }

            let wake_at = deadline_after(now, check_interval).min(deadline);
            let _ = tokio::time::timeout_at(wake_at, arrived).await;
        }
    }

    async fn renew_lock(
        &self,
        envelope: &MessageEnvelope,
        lock_timeout: Duration,
    ) -> Result<(), QueueError> {
        self.check_open()?;
        self.inner.broker.renew_lock(envelope, lock_timeout).await
    }

    async fn complete(&self, envelope: &mut MessageEnvelope) -> Result<(), QueueError> {
        self.check_open()?;
        self.inner.broker.complete(envelope).await
    }

    async fn abandon(&self, envelope: &mut MessageEnvelope) -> Result<(), QueueError> {
        self.check_open()?;
        self.inner.broker.abandon(envelope).await
    }

    async fn move_to_dead_letter(&self, envelope: &mut MessageEnvelope) -> Result<(), QueueError> {
        self.check_open()?;
        self.inner.broker.move_to_dead_letter(envelope).await?;
        self.inner
            .metrics
            .increment(&self.inner.name, QueueCounter::DeadMessages);
        Ok(())
    }

    /// Register `receiver` and have the pump hand it the buffered messages,
    /// then live deliveries, in order. Returns once registered; deliveries
    /// continue until `end_listen` or `close`.
    async fn listen(&self, receiver: Arc<dyn MessageReceiver>) -> Result<(), QueueError> {
        self.check_open()?;
        self.subscribe().await?;

        *self.receiver_slot()? = Some(receiver);
        self.inner.drain_requested.notify_one();
        trace!(queue = %self.inner.name, "Started listening messages at {}", self);
        Ok(())
    }

    fn end_listen(&self) {
        match self.receiver_slot() {
            Ok(mut slot) => *slot = None,
            Err(e) => warn!(queue = %self.inner.name, error = %e, "Could not end listening"),
        }
    }
}
