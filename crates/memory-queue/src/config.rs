//! Queue configuration.
//!
//! Every field carries a serde default so an absent file, or an entirely
//! unconfigured environment, yields a usable configuration. Sources are
//! applied in order, later ones overriding earlier ones:
//!
//! 1. An optional configuration file (format inferred from the extension)
//! 2. Environment variables prefixed `MEMQ__` with `__` as the nesting
//!    separator, e.g. `MEMQ__LISTEN_INTERVAL_MS=250`

use crate::connection::{ConnectionParams, CredentialParams};
use crate::error::ConfigurationError;
use crate::message::QueueName;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "MEMQ";

/// Default interval between listen loop iterations
pub const DEFAULT_LISTEN_INTERVAL_MS: u64 = 1000;

/// Default interval at which a waiting receive re-checks the queue
pub const DEFAULT_RECEIVE_CHECK_INTERVAL_MS: u64 = 100;

/// Configuration for a single queue instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Queue name; overrides the name the queue was created with
    pub name: Option<String>,

    /// Poll and lock interval used by the listen loop
    pub listen_interval_ms: u64,

    /// Upper bound on how long a waiting receive sleeps between checks
    pub receive_check_interval_ms: u64,

    /// Subscribe to the broker when a cached queue is opened
    pub auto_subscribe: bool,

    /// Broker connection settings
    pub connection: ConnectionParams,

    /// Broker credentials
    pub credential: CredentialParams,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: None,
            listen_interval_ms: DEFAULT_LISTEN_INTERVAL_MS,
            receive_check_interval_ms: DEFAULT_RECEIVE_CHECK_INTERVAL_MS,
            auto_subscribe: false,
            connection: ConnectionParams::default(),
            credential: CredentialParams::default(),
        }
    }
}

impl QueueConfig {
    /// Load configuration from an optional file plus `MEMQ__` environment
    /// variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        Self::from_config(config)
    }

    /// Deserialize and validate an already assembled configuration
    pub fn from_config(config: config::Config) -> Result<Self, ConfigurationError> {
        let queue_config: QueueConfig = config.try_deserialize()?;
        queue_config.validate()?;
        Ok(queue_config)
    }

    /// Check that intervals are positive and the name, when set, is valid
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.listen_interval_ms == 0 {
            return Err(ConfigurationError::Invalid {
                message: "listen_interval_ms must be greater than 0".to_string(),
            });
        }

        if self.receive_check_interval_ms == 0 {
            return Err(ConfigurationError::Invalid {
                message: "receive_check_interval_ms must be greater than 0".to_string(),
            });
        }

        if let Some(name) = &self.name {
            QueueName::new(name.clone()).map_err(|e| ConfigurationError::Invalid {
                message: e.to_string(),
            })?;
        }

        Ok(())
    }

    /// Resolve the queue name: the configured name wins over `default_name`
    pub fn resolve_name(&self, default_name: &QueueName) -> Result<QueueName, ConfigurationError> {
        match &self.name {
            Some(name) => QueueName::new(name.clone()).map_err(|e| ConfigurationError::Invalid {
                message: e.to_string(),
            }),
            None => Ok(default_name.clone()),
        }
    }

    pub fn listen_interval(&self) -> Duration {
        Duration::from_millis(self.listen_interval_ms)
    }

    pub fn receive_check_interval(&self) -> Duration {
        Duration::from_millis(self.receive_check_interval_ms)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
