//! In-process push broker.
//!
//! Every publish is pushed straight to the current subscriber. Messages
//! published while nobody is subscribed are dropped, as a topic would.

use super::cached::{DeliverySink, PushBroker};
use crate::error::QueueError;
use crate::message::MessageEnvelope;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::debug;

#[cfg(test)]
#[path = "loopback_tests.rs"]
mod tests;

#[derive(Debug, Default)]
pub struct LoopbackBroker {
    sink: Mutex<Option<DeliverySink>>,
    dropped: AtomicU64,
}

impl LoopbackBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_subscriber(&self) -> bool {
        self.sink
            .lock()
            .map(|sink| sink.as_ref().is_some_and(|s| !s.is_closed()))
            .unwrap_or(false)
    }

    /// Number of messages published with no subscriber attached
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn current_sink(&self) -> Result<Option<DeliverySink>, QueueError> {
        Ok(self.sink.lock().map_err(QueueError::poisoned)?.clone())
    }
}

#[async_trait]
impl PushBroker for LoopbackBroker {
    async fn subscribe(&self, sink: DeliverySink) -> Result<(), QueueError> {
        debug!(queue = %sink.queue_name(), "Loopback subscriber attached");
        *self.sink.lock().map_err(QueueError::poisoned)? = Some(sink);
        Ok(())
    }

    async fn unsubscribe(&self) -> Result<(), QueueError> {
        *self.sink.lock().map_err(QueueError::poisoned)? = None;
        Ok(())
    }

    async fn publish(&self, envelope: MessageEnvelope) -> Result<(), QueueError> {
        match self.current_sink()? {
            Some(sink) if !sink.is_closed() => sink.deliver(envelope),
            _ => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(
                    correlation_id = envelope.correlation_id().unwrap_or_default(),
                    "Dropped message {} with no subscriber",
                    envelope
                );
                Ok(())
            }
        }
    }
}
