//! Message types for queue operations including core domain identifiers.

use crate::error::{SerializationError, ValidationError};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::str::FromStr;

/// Number of payload bytes shown by the envelope's `Display` output.
const DISPLAY_PAYLOAD_BYTES: usize = 50;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Validated queue name with length and character restrictions
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueName(String);

impl QueueName {
    /// Create new queue name with validation
    pub fn new(name: String) -> Result<Self, ValidationError> {
        if name.is_empty() || name.len() > 260 {
            return Err(ValidationError::OutOfRange {
                field: "queue_name".to_string(),
                message: "must be 1-260 characters".to_string(),
            });
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "only ASCII alphanumeric, hyphens, and underscores allowed".to_string(),
            });
        }

        if name.starts_with('-') || name.ends_with('-') || name.contains("--") {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "no leading/trailing hyphens or consecutive hyphens".to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Get queue name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

/// Unique identifier for messages within the queue system
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Generate new random message ID
    pub fn new() -> Self {
        let id = uuid::Uuid::new_v4();
        Self(id.to_string())
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "message_id".to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }
}

/// Handle identifying one in-flight delivery of one envelope.
///
/// Tokens are issued from a per-queue sequence starting at zero, so `0` is a
/// perfectly valid lock. "Not locked" is expressed as `Option::None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockToken(u64);

impl LockToken {
    pub(crate) fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw sequence value of the token
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for LockToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Timestamp wrapper for consistent time handling
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current time
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create timestamp from DateTime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

impl FromStr for Timestamp {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let dt = s.parse::<DateTime<Utc>>()?;
        Ok(Self::from_datetime(dt))
    }
}

// ============================================================================
// Message Envelope
// ============================================================================

/// A message plus its delivery metadata.
///
/// The identifier, type and payload are fixed at construction. The sent time
/// and the lock token are delivery state owned by the queue: they can be read
/// by anyone but only changed by queue operations.
#[derive(Debug, Clone)]
pub struct MessageEnvelope {
    correlation_id: Option<String>,
    message_id: MessageId,
    message_type: String,
    message: Bytes,
    sent_time: Option<Timestamp>,
    lock_token: Option<LockToken>,
}

impl MessageEnvelope {
    /// Create envelope with a binary payload stored verbatim
    pub fn new(
        correlation_id: Option<String>,
        message_type: impl Into<String>,
        message: impl Into<Bytes>,
    ) -> Self {
        Self {
            correlation_id,
            message_id: MessageId::new(),
            message_type: message_type.into(),
            message: message.into(),
            sent_time: None,
            lock_token: None,
        }
    }

    /// Create envelope whose payload is the UTF-8 encoding of `message`
    pub fn from_string(
        correlation_id: Option<String>,
        message_type: impl Into<String>,
        message: &str,
    ) -> Self {
        Self::new(
            correlation_id,
            message_type,
            Bytes::copy_from_slice(message.as_bytes()),
        )
    }

    /// Create envelope from a structured value.
    ///
    /// Values that serialize to a JSON string are stored as that plain string,
    /// `null` produces an empty payload, everything else is stored as UTF-8
    /// JSON.
    pub fn from_json<T: Serialize + ?Sized>(
        correlation_id: Option<String>,
        message_type: impl Into<String>,
        value: &T,
    ) -> Result<Self, SerializationError> {
        let body = match serde_json::to_value(value)? {
            serde_json::Value::Null => Bytes::new(),
            serde_json::Value::String(text) => Bytes::from(text),
            other => Bytes::from(serde_json::to_vec(&other)?),
        };

        Ok(Self::new(correlation_id, message_type, body))
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn message_id(&self) -> &MessageId {
        &self.message_id
    }

    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    /// Raw payload bytes
    pub fn message(&self) -> &Bytes {
        &self.message
    }

    /// Time the queue accepted the envelope, if it has been sent
    pub fn sent_time(&self) -> Option<&Timestamp> {
        self.sent_time.as_ref()
    }

    /// Lock held by the current delivery, if any
    pub fn lock_token(&self) -> Option<LockToken> {
        self.lock_token
    }

    /// Check whether the envelope is currently locked by a receive
    pub fn is_locked(&self) -> bool {
        self.lock_token.is_some()
    }

    /// Read the payload as a UTF-8 string
    pub fn message_as_string(&self) -> Result<String, SerializationError> {
        std::str::from_utf8(&self.message)
            .map(str::to_owned)
            .map_err(|_| SerializationError::InvalidUtf8)
    }

    /// Parse the payload as JSON. An empty payload yields `None`.
    pub fn message_as_json<T: DeserializeOwned>(&self) -> Result<Option<T>, SerializationError> {
        if self.message.is_empty() {
            return Ok(None);
        }

        Ok(Some(serde_json::from_slice(&self.message)?))
    }

    pub(crate) fn set_sent_time(&mut self, sent_time: Timestamp) {
        self.sent_time = Some(sent_time);
    }

    pub(crate) fn set_lock_token(&mut self, lock_token: Option<LockToken>) {
        self.lock_token = lock_token;
    }
}

impl std::fmt::Display for MessageEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let correlation_id = self.correlation_id.as_deref().unwrap_or("---");
        let message_type = if self.message_type.is_empty() {
            "---"
        } else {
            &self.message_type
        };

        write!(f, "[{},{},", correlation_id, message_type)?;
        if self.message.is_empty() {
            write!(f, "---")?;
        } else {
            let end = self.message.len().min(DISPLAY_PAYLOAD_BYTES);
            write!(f, "{}", String::from_utf8_lossy(&self.message[..end]))?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
