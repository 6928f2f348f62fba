//! Capability descriptors advertised by queue implementations.
//!
//! Capabilities are advisory metadata: collaborators consult them before
//! invoking an operation, the queues themselves never enforce them.

use serde::{Deserialize, Serialize};

/// Set of operations a queue implementation supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagingCapabilities {
    pub message_count: bool,
    pub send: bool,
    pub receive: bool,
    pub peek: bool,
    pub peek_batch: bool,
    pub renew_lock: bool,
    pub abandon: bool,
    pub dead_letter: bool,
    pub clear: bool,
}

impl MessagingCapabilities {
    /// Capabilities of a queue that supports nothing
    pub const fn none() -> Self {
        Self {
            message_count: false,
            send: false,
            receive: false,
            peek: false,
            peek_batch: false,
            renew_lock: false,
            abandon: false,
            dead_letter: false,
            clear: false,
        }
    }

    /// Capabilities of the in-memory queue.
    ///
    /// Dead-lettering discards the message rather than moving it to a
    /// dead-letter store, so it is not advertised.
    pub const fn memory() -> Self {
        Self {
            message_count: true,
            send: true,
            receive: true,
            peek: true,
            peek_batch: true,
            renew_lock: true,
            abandon: true,
            dead_letter: false,
            clear: true,
        }
    }

    /// Capabilities of a push-only broker (send and listen, no acknowledgements)
    pub const fn push_only() -> Self {
        Self {
            send: true,
            receive: true,
            ..Self::none()
        }
    }

    /// Overlay the operations a local delivery buffer can serve
    pub const fn with_local_buffer(self) -> Self {
        Self {
            message_count: true,
            peek: true,
            peek_batch: true,
            receive: true,
            clear: true,
            ..self
        }
    }
}

impl Default for MessagingCapabilities {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
#[path = "capabilities_tests.rs"]
mod tests;
