//! Table of in-flight deliveries keyed by lock token.

use crate::deadline::deadline_after;
use crate::message::{LockToken, MessageEnvelope};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// A delivered envelope held until it is completed, abandoned or
/// dead-lettered
#[derive(Debug, Clone)]
pub(crate) struct LockedMessage {
    pub(crate) envelope: MessageEnvelope,
    pub(crate) expires_at: Instant,
    pub(crate) timeout: Duration,
}

impl LockedMessage {
    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Lock table plus the token sequence.
///
/// The sequence is never reset, so a token is unique for the life of the
/// queue instance even across `clear`.
#[derive(Debug, Default)]
pub(crate) struct LockTable {
    locked: HashMap<LockToken, LockedMessage>,
    next_token: u64,
}

impl LockTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Lock `envelope` for `timeout`, stamping the new token on it.
    ///
    /// Returns the caller's copy of the locked envelope.
    pub(crate) fn lock(
        &mut self,
        mut envelope: MessageEnvelope,
        timeout: Duration,
        now: Instant,
    ) -> MessageEnvelope {
        let token = LockToken::new(self.next_token);
        self.next_token += 1;

        envelope.set_lock_token(Some(token));
        self.locked.insert(
            token,
            LockedMessage {
                envelope: envelope.clone(),
                expires_at: deadline_after(now, timeout),
                timeout,
            },
        );

        envelope
    }

    /// Extend an unexpired lock to `now + timeout`.
    ///
    /// Returns `false` when the lock is unknown or already expired; neither
    /// case changes the table.
    pub(crate) fn renew(&mut self, token: LockToken, timeout: Duration, now: Instant) -> bool {
        match self.locked.get_mut(&token) {
            Some(locked) if !locked.is_expired(now) => {
                locked.expires_at = deadline_after(now, timeout);
                locked.timeout = timeout;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn remove(&mut self, token: LockToken) -> Option<LockedMessage> {
        self.locked.remove(&token)
    }

    pub(crate) fn len(&self) -> usize {
        self.locked.len()
    }

    pub(crate) fn clear(&mut self) {
        self.locked.clear();
    }
}

#[cfg(test)]
#[path = "lock_table_tests.rs"]
mod tests;
