//! Poll backoff policy for the lifecycle coordinator.
//!
//! Pure function and constants; the worker supplies its own configured
//! base/cap values so tests can shrink delays to milliseconds.

use std::time::Duration;

/// Default delay before the first poll (seconds).
pub const DEFAULT_POLL_BASE_SECS: u64 = 2;

/// Default ceiling on the inter-poll delay (seconds).
pub const DEFAULT_POLL_CAP_SECS: u64 = 60;

/// Default number of polls before a still-pending job is timed out.
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 30;

/// Backoff multiplier between consecutive polls.
pub const BACKOFF_FACTOR: u32 = 2;

/// Delay before poll attempt `attempt` (0-based): `base * 2^attempt`,
/// capped at `cap`.
///
/// Saturates rather than overflowing for large attempt counts.
pub fn poll_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let multiplier = BACKOFF_FACTOR.checked_pow(attempt).unwrap_or(u32::MAX);
    base.checked_mul(multiplier).unwrap_or(cap).min(cap)
}
