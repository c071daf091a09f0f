//! Reconnect backoff policy
//!
//! Exponential delay between reconnect attempts, capped at a maximum and
//! spread by a bounded jitter so that many clients reconnecting to the same
//! backend do not retry in lockstep.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Exponential backoff with cap and jitter.
///
/// For attempt `n >= 1` the delay is `min(max_delay, base * 2^(n-1))` plus a
/// jitter in `[0, jitter)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay before the first reconnect attempt
    pub base: Duration,
    /// Upper bound for the exponential part of the delay
    pub max_delay: Duration,
    /// Exclusive upper bound of the random offset added to each delay
    pub jitter: Duration,
}

impl BackoffPolicy {
    /// Create a new policy
    pub fn new(base: Duration, max_delay: Duration, jitter: Duration) -> Self {
        Self {
            base,
            max_delay,
            jitter,
        }
    }

    /// Exponential part of the delay for the given 1-based attempt.
    ///
    /// Attempt `0` is treated as attempt `1`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Full delay for the given 1-based attempt, jitter included
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay(attempt) + jitter_duration(self.jitter, attempt)
    }

    /// Largest delay this policy can ever produce
    pub fn upper_bound(&self) -> Duration {
        self.max_delay.max(self.base) + self.jitter
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(30_000),
            jitter: Duration::from_millis(300),
        }
    }
}

fn jitter_duration(max_jitter: Duration, attempt: u32) -> Duration {
    let limit_nanos = max_jitter.as_nanos().min(u64::MAX as u128) as u64;
    if limit_nanos == 0 {
        return Duration::ZERO;
    }

    let now_nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as u64;
    let mixed = now_nanos ^ (u64::from(attempt).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    Duration::from_nanos(mixed % limit_nanos)
}
