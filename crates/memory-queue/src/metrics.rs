//! Message counters recorded by queues.
//!
//! Queues report through an injected [`MetricsRecorder`] labelled with their
//! own name; nothing is kept in global state.

use crate::message::QueueName;
use prometheus::{IntCounterVec, Opts, Registry};
use std::collections::HashMap;
use std::sync::Mutex;

/// Counters a queue increments during delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueCounter {
    SentMessages,
    ReceivedMessages,
    DeadMessages,
}

impl QueueCounter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SentMessages => "sent_messages",
            Self::ReceivedMessages => "received_messages",
            Self::DeadMessages => "dead_messages",
        }
    }

    /// Counter key in the `queue.<name>.<counter>` form
    pub fn key(&self, queue: &QueueName) -> String {
        format!("queue.{}.{}", queue, self.as_str())
    }
}

impl std::fmt::Display for QueueCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sink for queue counters. Purely observational.
pub trait MetricsRecorder: Send + Sync {
    fn increment(&self, queue: &QueueName, counter: QueueCounter);
}

/// Recorder that drops every measurement
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsRecorder for NoopMetrics {
    fn increment(&self, _queue: &QueueName, _counter: QueueCounter) {}
}

/// Recorder that keeps counts in memory, keyed `queue.<name>.<counter>`
#[derive(Debug, Default)]
pub struct InMemoryCounters {
    counts: Mutex<HashMap<String, u64>>,
}

impl InMemoryCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of one counter
    pub fn get(&self, queue: &QueueName, counter: QueueCounter) -> u64 {
        self.counts
            .lock()
            .map(|counts| counts.get(&counter.key(queue)).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Snapshot of every counter recorded so far
    pub fn snapshot(&self) -> HashMap<String, u64> {
        self.counts
            .lock()
            .map(|counts| counts.clone())
            .unwrap_or_default()
    }
}

impl MetricsRecorder for InMemoryCounters {
    fn increment(&self, queue: &QueueName, counter: QueueCounter) {
        if let Ok(mut counts) = self.counts.lock() {
            *counts.entry(counter.key(queue)).or_insert(0) += 1;
        }
    }
}

/// Recorder exporting counters to a Prometheus registry
#[derive(Debug, Clone)]
pub struct PrometheusMetrics {
    messages_total: IntCounterVec,
}

impl PrometheusMetrics {
    /// Register the queue counters on `registry`
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let messages_total = IntCounterVec::new(
            Opts::new(
                "memory_queue_messages_total",
                "Messages sent, received and dead-lettered per queue",
            ),
            &["queue_name", "counter"],
        )?;
        registry.register(Box::new(messages_total.clone()))?;

        Ok(Self { messages_total })
    }

    /// Current value of one counter
    pub fn get(&self, queue: &QueueName, counter: QueueCounter) -> u64 {
        self.messages_total
            .with_label_values(&[queue.as_str(), counter.as_str()])
            .get()
    }
}

impl MetricsRecorder for PrometheusMetrics {
    fn increment(&self, queue: &QueueName, counter: QueueCounter) {
        self.messages_total
            .with_label_values(&[queue.as_str(), counter.as_str()])
            .inc();
    }
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
