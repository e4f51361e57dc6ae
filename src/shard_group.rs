use crate::error::DbError;
use crate::shard::Shard;
use crate::types::Timestamp;
use crate::utils::{clamp_to_timestamp, round_nanos_wide};

/// A shard bound to the half-open time window `[min, max)`.
///
/// The last window of the timestamp range cannot be represented half-open; its `max` is
/// clamped to `i64::MAX` and the window is closed at that end.
///
/// Points whose timestamp falls inside the window are stored in this group's shard.
/// Groups are never destroyed by retention: once expired they are reset and parked in a
/// pool, then rebound to a new window with [`ShardGroup::init_time`].
#[derive(Debug)]
pub struct ShardGroup<T> {
    min: Timestamp,
    max: Timestamp,
    /// `max` was clamped to `i64::MAX`, so the window includes it.
    closed_at_max: bool,
    shard: Shard<T>,
}

impl<T> ShardGroup<T> {
    /// Allocates a group whose window contains `t`.
    pub fn new(t: Timestamp, bucket: i64, partition_count: usize) -> Self {
        let mut group = Self {
            min: 0,
            max: 0,
            closed_at_max: false,
            shard: Shard::new(partition_count),
        };
        group.init_time(t, bucket);
        group
    }

    /// Binds the group to the bucket-aligned window containing `t`.
    ///
    /// `t` is rounded to the nearest multiple of `bucket`. If rounding moved it forward the
    /// window ends at the rounded instant, otherwise it starts there. A `t` that is already
    /// aligned starts its own window. Bounds are computed wide and clamped to the
    /// `Timestamp` range, so the window contains `t` for every `t`.
    pub fn init_time(&mut self, t: Timestamp, bucket: i64) {
        let (t, d) = (i128::from(t), i128::from(bucket.max(1)));
        let rounded = round_nanos_wide(t, d);
        let (min, max) = if rounded > t {
            (rounded - d, rounded)
        } else {
            (rounded, rounded + d)
        };
        self.min = clamp_to_timestamp(min);
        self.max = clamp_to_timestamp(max);
        self.closed_at_max = max > i128::from(Timestamp::MAX);
    }

    /// `min <= t < max`, or `min <= t <= max` for the clamped last window.
    #[inline]
    pub fn contains(&self, t: Timestamp) -> bool {
        self.min <= t && (t < self.max || (self.closed_at_max && t == self.max))
    }

    /// Whether every timestamp the window can hold is below `cutoff`.
    #[inline]
    pub fn expired_by(&self, cutoff: Timestamp) -> bool {
        self.max <= cutoff && !self.closed_at_max
    }

    /// Whether a query over `[min, max)` should visit this group.
    ///
    /// True when either query bound falls strictly inside the window, or when the query
    /// starts exactly at the window start. A query window that strictly encloses the group
    /// does not select it.
    pub fn have(&self, min: Timestamp, max: Timestamp) -> bool {
        if self.min < min && self.max > min {
            return true;
        }
        if self.min < max && self.max > max {
            return true;
        }
        self.min == min
    }

    pub fn min(&self) -> Timestamp {
        self.min
    }

    pub fn max(&self) -> Timestamp {
        self.max
    }

    pub fn window(&self) -> (Timestamp, Timestamp) {
        (self.min, self.max)
    }

    pub fn shard(&self) -> &Shard<T> {
        &self.shard
    }

    /// Empties the shard so the group can be pooled. The partition ring stays allocated.
    pub fn retire(&self) -> Result<(), DbError> {
        self.shard.reset()
    }
}
