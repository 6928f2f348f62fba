//! Connection and credential resolution.
//!
//! The in-memory queue has nothing to connect to, but it still runs the
//! resolution step on `open` so that its lifecycle matches broker-backed
//! queues: a resolver failure keeps the queue closed.

use crate::config::QueueConfig;
use crate::error::QueueError;
use crate::message::QueueName;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Connection parameters for a queue broker
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionParams {
    pub uri: Option<String>,
    pub protocol: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl ConnectionParams {
    /// Check if no connection setting has been supplied
    pub fn is_empty(&self) -> bool {
        self.uri.is_none() && self.protocol.is_none() && self.host.is_none() && self.port.is_none()
    }
}

/// Credential parameters for a queue broker
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialParams {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl CredentialParams {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.password.is_none()
    }
}

impl std::fmt::Debug for CredentialParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialParams")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

/// Resolves the connection a queue opens against
#[async_trait]
pub trait ConnectionResolver: Send + Sync {
    async fn resolve(&self, queue: &QueueName) -> Result<Option<ConnectionParams>, QueueError>;
}

/// Resolves the credentials a queue opens with
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn lookup(&self, queue: &QueueName) -> Result<Option<CredentialParams>, QueueError>;
}

/// Connection resolver backed by the `connection` section of [`QueueConfig`]
#[derive(Debug, Clone, Default)]
pub struct ConfigConnectionResolver {
    params: ConnectionParams,
}

impl ConfigConnectionResolver {
    pub fn new(config: &QueueConfig) -> Self {
        Self {
            params: config.connection.clone(),
        }
    }
}

#[async_trait]
impl ConnectionResolver for ConfigConnectionResolver {
    async fn resolve(&self, _queue: &QueueName) -> Result<Option<ConnectionParams>, QueueError> {
        if self.params.is_empty() {
            return Ok(None);
        }

        if let Some(port) = self.params.port {
            if port == 0 {
                return Err(QueueError::ConnectionFailed {
                    message: "connection port must not be 0".to_string(),
                });
            }
        }

        Ok(Some(self.params.clone()))
    }
}

/// Credential resolver backed by the `credential` section of [`QueueConfig`]
#[derive(Debug, Clone, Default)]
pub struct ConfigCredentialResolver {
    params: CredentialParams,
}

impl ConfigCredentialResolver {
    pub fn new(config: &QueueConfig) -> Self {
        Self {
            params: config.credential.clone(),
        }
    }
}

#[async_trait]
impl CredentialResolver for ConfigCredentialResolver {
    async fn lookup(&self, _queue: &QueueName) -> Result<Option<CredentialParams>, QueueError> {
        if self.params.is_empty() {
            Ok(None)
        } else {
            Ok(Some(self.params.clone()))
        }
    }
}

/// Management interface over a set of named queues.
///
/// Connections that cannot enumerate, create or delete queues return an empty
/// list or succeed without effect.
#[async_trait]
pub trait MessageQueueConnection: Send + Sync {
    /// Names of the queues registered with this connection
    async fn read_queue_names(&self) -> Result<Vec<String>, QueueError>;

    /// Create a queue; creating an existing queue succeeds without effect
    async fn create_queue(&self, name: &str) -> Result<(), QueueError>;

    /// Delete a queue; deleting an unknown queue succeeds without effect
    async fn delete_queue(&self, name: &str) -> Result<(), QueueError>;
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
