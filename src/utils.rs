//! Time helpers and the clock collaborator used by retention.

use crate::types::Timestamp;
use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of "now" for retention cutoffs.
pub trait Clock: Debug + Send + Sync + 'static {
    /// Current time in nanoseconds since the Unix epoch.
    fn now(&self) -> Timestamp;
}

/// Wall clock backed by [`SystemTime`].
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Timestamp {
        system_time_to_nanos(SystemTime::now())
    }
}

pub fn system_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}

/// A clock that only moves when told to. Handy for driving retention deterministically.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now: Timestamp) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(duration_to_nanos(by), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

/// Converts a duration to nanoseconds, saturating at `i64::MAX`.
#[inline]
pub fn duration_to_nanos(d: Duration) -> i64 {
    i64::try_from(d.as_nanos()).unwrap_or(i64::MAX)
}

/// Converts a [`SystemTime`] to signed nanoseconds since the Unix epoch.
pub fn system_time_to_nanos(t: SystemTime) -> Timestamp {
    match t.duration_since(UNIX_EPOCH) {
        Ok(after) => duration_to_nanos(after),
        Err(before) => duration_to_nanos(before.duration()).saturating_neg(),
    }
}

/// Current wall-clock time in nanoseconds since the Unix epoch.
pub fn now_nanos() -> Timestamp {
    system_time_to_nanos(SystemTime::now())
}

/// Rounds `t` to the nearest multiple of `d`; halfway values round up. The result is
/// clamped to the `Timestamp` range.
///
/// `d` must be positive.
pub fn round_nanos(t: Timestamp, d: i64) -> Timestamp {
    clamp_to_timestamp(round_nanos_wide(i128::from(t), i128::from(d)))
}

/// [`round_nanos`] without the clamp, for callers that need bounds past the `i64` range.
pub(crate) fn round_nanos_wide(t: i128, d: i128) -> i128 {
    let r = t.rem_euclid(d);
    let down = t - r;
    if r < d - r {
        down
    } else {
        down + d
    }
}

/// Saturates a widened nanosecond value into the `Timestamp` range.
#[inline]
pub(crate) fn clamp_to_timestamp(v: i128) -> Timestamp {
    i64::try_from(v).unwrap_or(if v < 0 { i64::MIN } else { i64::MAX })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_to_nearest_multiple() {
        assert_eq!(round_nanos(1, 60), 0);
        assert_eq!(round_nanos(29, 60), 0);
        assert_eq!(round_nanos(30, 60), 60);
        assert_eq!(round_nanos(59, 60), 60);
        assert_eq!(round_nanos(60, 60), 60);
        assert_eq!(round_nanos(-1, 60), 0);
        assert_eq!(round_nanos(-31, 60), -60);
        assert_eq!(round_nanos(-30, 60), 0);
    }

    #[test]
    fn round_saturates_at_range_ends() {
        let minute = 60_000_000_000;
        assert_eq!(round_nanos(i64::MIN, minute), -9_223_372_020_000_000_000);
        assert_eq!(round_nanos(i64::MAX, minute), 9_223_372_020_000_000_000);

        // Odd i64::MAX rounds up to MAX + 1, and MIN - 1 is the nearest multiple of 3.
        assert_eq!(round_nanos_wide(i128::from(i64::MAX), 2), i128::from(i64::MAX) + 1);
        assert_eq!(round_nanos(i64::MAX, 2), i64::MAX);
        assert_eq!(round_nanos_wide(i128::from(i64::MIN), 3), i128::from(i64::MIN) - 1);
        assert_eq!(round_nanos(i64::MIN, 3), i64::MIN);
    }

    #[test]
    fn system_time_conversions() {
        assert_eq!(system_time_to_nanos(UNIX_EPOCH), 0);
        assert_eq!(
            system_time_to_nanos(UNIX_EPOCH + Duration::from_secs(2)),
            2_000_000_000
        );
        assert_eq!(
            system_time_to_nanos(UNIX_EPOCH - Duration::from_secs(1)),
            -1_000_000_000
        );
        assert_eq!(duration_to_nanos(Duration::MAX), i64::MAX);
    }

    #[test]
    fn manual_clock_moves_on_request() {
        let clock = ManualClock::new(10);
        assert_eq!(clock.now(), 10);
        clock.advance(Duration::from_nanos(5));
        assert_eq!(clock.now(), 15);
        clock.set(100);
        assert_eq!(clock.now(), 100);
    }

    #[test]
    fn system_clock_is_after_epoch() {
        assert!(SystemClock.now() > 0);
        assert!(now_nanos() > 0);
    }
}
