//! Monotonic clock helpers for expiration deadlines.
//!
//! Deadlines are stored as milliseconds on a process-local monotonic
//! clock, which makes them immune to wall-clock jumps and valid across
//! every shard in the process: a migrated key carries its absolute
//! deadline and the destination shard reads it against the same clock.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Sentinel deadline meaning "never expires".
pub const NO_EXPIRY: u64 = 0;

/// Current monotonic time in milliseconds since process start.
#[inline]
pub fn now_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START.get_or_init(Instant::now).elapsed().as_millis() as u64
}

/// Converts an optional TTL into an absolute deadline.
#[inline]
pub fn deadline_after(ttl: Option<Duration>) -> u64 {
    match ttl {
        Some(d) => now_ms().saturating_add(d.as_millis() as u64),
        None => NO_EXPIRY,
    }
}

/// Returns `true` if the deadline is set and has passed.
#[inline]
pub fn is_expired(deadline_ms: u64) -> bool {
    deadline_ms != NO_EXPIRY && now_ms() >= deadline_ms
}

/// Whole seconds remaining until the deadline, or `None` when the key
/// carries no expiry.
#[inline]
pub fn remaining_secs(deadline_ms: u64) -> Option<u64> {
    if deadline_ms == NO_EXPIRY {
        None
    } else {
        Some(deadline_ms.saturating_sub(now_ms()) / 1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_ttl_never_expires() {
        assert_eq!(deadline_after(None), NO_EXPIRY);
        assert!(!is_expired(NO_EXPIRY));
        assert_eq!(remaining_secs(NO_EXPIRY), None);
    }

    #[test]
    fn future_deadline_not_expired() {
        let deadline = deadline_after(Some(Duration::from_secs(60)));
        assert!(!is_expired(deadline));
        let secs = remaining_secs(deadline).unwrap();
        assert!((58..=60).contains(&secs));
    }

    #[test]
    fn past_deadline_expired() {
        let deadline = now_ms() + 1;
        std::thread::sleep(Duration::from_millis(5));
        assert!(is_expired(deadline));
        assert_eq!(remaining_secs(deadline), Some(0));
    }

    #[test]
    fn clock_is_monotonic() {
        let a = now_ms();
        let b = now_ms();
        assert!(b >= a);
    }
}
