//! Saturating instant arithmetic for caller-supplied durations.

use std::time::Duration;
use tokio::time::Instant;

/// Roughly 30 years; stands in for "never" when a duration does not fit
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `now + duration`, capped at a far-future instant instead of overflowing.
///
/// `Duration::MAX` is a common way of asking to wait or lock forever.
pub(crate) fn deadline_after(now: Instant, duration: Duration) -> Instant {
    now.checked_add(duration.min(FAR_FUTURE)).unwrap_or(now)
}

#[cfg(test)]
#[path = "deadline_tests.rs"]
mod tests;
