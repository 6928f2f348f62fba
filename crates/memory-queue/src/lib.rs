//! # Memory Queue
//!
//! In-process message queue that emulates the delivery semantics of a
//! message broker, for tests and single-process deployments.
//!
//! This library provides:
//! - FIFO delivery with visibility-timeout locks
//! - Complete, abandon, renew and dead-letter transitions
//! - Blocking receive with a wait timeout
//! - A listen loop that pushes messages to a registered receiver
//! - A local-buffer queue over push-subscription brokers
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all queue operations
//! - [`message`] - Envelopes, queue names and lock tokens
//! - [`queue`] - The [`MessageQueue`] interface
//! - [`receiver`] - Consumers driven by a listen loop
//! - [`providers`] - Memory and cached queue implementations
//! - [`factory`] - Registry of named memory queues
//! - [`config`] - Queue configuration loading
//! - [`connection`] - Connection and credential resolution
//! - [`metrics`] - Sent, received and dead message counters

// Module declarations
pub mod capabilities;
pub mod config;
pub mod connection;
mod deadline;
pub mod error;
pub mod factory;
mod lock_table;
pub mod message;
pub mod metrics;
pub mod providers;
pub mod queue;
pub mod receiver;
mod store;

// Re-export commonly used types at crate root for convenience
pub use capabilities::MessagingCapabilities;
pub use config::QueueConfig;
pub use connection::{
    ConfigConnectionResolver, ConfigCredentialResolver, ConnectionParams, ConnectionResolver,
    CredentialParams, CredentialResolver, MessageQueueConnection,
};
pub use error::{ConfigurationError, QueueError, SerializationError, ValidationError};
pub use factory::MemoryQueueFactory;
pub use message::{LockToken, MessageEnvelope, MessageId, QueueName, Timestamp};
pub use metrics::{InMemoryCounters, MetricsRecorder, NoopMetrics, PrometheusMetrics, QueueCounter};
pub use providers::{
    CachedMessageQueue, DeliverySink, LoopbackBroker, MemoryMessageQueue, PushBroker,
    QueueReferences,
};
pub use queue::MessageQueue;
pub use receiver::{CallbackMessageReceiver, MessageReceiver, TestMessageReceiver};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
