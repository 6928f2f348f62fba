//! Factory and registry of named in-memory queues.

use crate::config::QueueConfig;
use crate::connection::MessageQueueConnection;
use crate::error::{ConfigurationError, QueueError};
use crate::message::QueueName;
use crate::providers::{MemoryMessageQueue, QueueReferences};
use crate::queue::MessageQueue;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

#[cfg(test)]
#[path = "factory_tests.rs"]
mod tests;

/// Creates configured [`MemoryMessageQueue`]s and keeps track of them by
/// name.
///
/// Every queue gets the factory's configuration and shares its collaborators,
/// so one metrics recorder sees the traffic of all of them.
pub struct MemoryQueueFactory {
    config: QueueConfig,
    references: QueueReferences,
    queues: Mutex<HashMap<String, MemoryMessageQueue>>,
}

impl MemoryQueueFactory {
    pub fn new(config: QueueConfig, references: QueueReferences) -> Result<Self, ConfigurationError> {
        config.validate()?;

        // Each queue is named by the caller, not by the shared configuration
        let config = QueueConfig {
            name: None,
            ..config
        };

        Ok(Self {
            config,
            references,
            queues: Mutex::new(HashMap::new()),
        })
    }

    /// Queue registered under `name`, creating it on first use
    pub fn get_or_create(&self, name: &str) -> Result<MemoryMessageQueue, QueueError> {
        let mut queues = self.queues()?;
        if let Some(queue) = queues.get(name) {
            return Ok(queue.clone());
        }

        let queue_name = QueueName::new(name.to_string())?;
        let queue = MemoryMessageQueue::with_config(
            queue_name,
            self.config.clone(),
            self.references.clone(),
        )?;

        queues.insert(name.to_string(), queue.clone());
        debug!(queue = name, "Created queue");
        Ok(queue)
    }

    /// Queue registered under `name`, if any
    pub fn get(&self, name: &str) -> Option<MemoryMessageQueue> {
        self.queues
            .lock()
            .ok()
            .and_then(|queues| queues.get(name).cloned())
    }

    fn queues(&self) -> Result<MutexGuard<'_, HashMap<String, MemoryMessageQueue>>, QueueError> {
        self.queues.lock().map_err(QueueError::poisoned)
    }
}

impl Default for MemoryQueueFactory {
    fn default() -> Self {
        Self {
            config: QueueConfig::default(),
            references: QueueReferences::default(),
            queues: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl MessageQueueConnection for MemoryQueueFactory {
    async fn read_queue_names(&self) -> Result<Vec<String>, QueueError> {
        let mut names: Vec<String> = self.queues()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn create_queue(&self, name: &str) -> Result<(), QueueError> {
        self.get_or_create(name).map(|_| ())
    }

    /// Close and forget the queue; existing handles stop working
    async fn delete_queue(&self, name: &str) -> Result<(), QueueError> {
        let removed = self.queues()?.remove(name);

        if let Some(queue) = removed {
            queue.close().await?;
            queue.clear().await?;
            debug!(queue = name, "Deleted queue");
        }

        Ok(())
    }
}
