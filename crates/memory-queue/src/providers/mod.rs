//! Queue implementations.
//!
//! - [`memory`]: the in-process queue with locks and a polling listen loop
//! - [`cached`]: a local buffer in front of a push-subscription broker
//! - [`loopback`]: an in-process push broker for the cached queue

pub mod cached;
pub mod loopback;
pub mod memory;

pub use cached::{CachedMessageQueue, DeliverySink, PushBroker};
pub use loopback::LoopbackBroker;
pub use memory::MemoryMessageQueue;

use crate::config::QueueConfig;
use crate::connection::{
    ConfigConnectionResolver, ConfigCredentialResolver, ConnectionResolver, CredentialResolver,
};
use crate::error::QueueError;
use crate::message::QueueName;
use crate::metrics::{MetricsRecorder, NoopMetrics};
use std::sync::Arc;
use tracing::debug;

/// Collaborators a queue is wired with.
///
/// Resolvers left unset fall back to the connection and credential sections
/// of the queue's configuration.
#[derive(Clone, Default)]
pub struct QueueReferences {
    pub metrics: Option<Arc<dyn MetricsRecorder>>,
    pub connection_resolver: Option<Arc<dyn ConnectionResolver>>,
    pub credential_resolver: Option<Arc<dyn CredentialResolver>>,
}

impl QueueReferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_connection_resolver(mut self, resolver: Arc<dyn ConnectionResolver>) -> Self {
        self.connection_resolver = Some(resolver);
        self
    }

    pub fn with_credential_resolver(mut self, resolver: Arc<dyn CredentialResolver>) -> Self {
        self.credential_resolver = Some(resolver);
        self
    }

    pub(crate) fn metrics(&self) -> Arc<dyn MetricsRecorder> {
        self.metrics
            .clone()
            .unwrap_or_else(|| Arc::new(NoopMetrics))
    }

    pub(crate) fn connection_resolver(&self, config: &QueueConfig) -> Arc<dyn ConnectionResolver> {
        self.connection_resolver
            .clone()
            .unwrap_or_else(|| Arc::new(ConfigConnectionResolver::new(config)))
    }

    pub(crate) fn credential_resolver(&self, config: &QueueConfig) -> Arc<dyn CredentialResolver> {
        self.credential_resolver
            .clone()
            .unwrap_or_else(|| Arc::new(ConfigCredentialResolver::new(config)))
    }
}

/// Run connection then credential resolution ahead of opening a queue.
pub(crate) async fn resolve_open_params(
    queue: &QueueName,
    connection_resolver: &dyn ConnectionResolver,
    credential_resolver: &dyn CredentialResolver,
) -> Result<(), QueueError> {
    let connection = connection_resolver.resolve(queue).await?;
    let credential = credential_resolver.lookup(queue).await?;

    debug!(
        queue = %queue,
        has_connection = connection.is_some(),
        has_credential = credential.is_some(),
        "Resolved connection parameters"
    );

    Ok(())
}
