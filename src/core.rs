//! Time-windowed engine: routes points to shard groups by timestamp, answers tag/range
//! queries across groups, and recycles expired groups through a pool.

use crate::config::TsdbConfig;
use crate::error::DbError;
use crate::retention::{RetentionTarget, RetentionWorker, SweepReport};
use crate::shard_group::ShardGroup;
use crate::telemetry::{db_metrics, DbEvent};
use crate::types::{Point, Tag, Timestamp, Value};
use crate::utils::duration_to_nanos;

use rayon::prelude::*;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Counters describing the current topology and contents of a [`Tsdb`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TsdbStats {
    pub active_shard_groups: usize,
    pub pooled_shard_groups: usize,
    pub series: usize,
    pub values: usize,
}

/// Shard group topology, guarded by the engine lock.
#[derive(Debug)]
struct Topology<T> {
    /// Groups bound to a window, in creation order. Windows never overlap.
    active: Vec<ShardGroup<T>>,
    /// Retired groups kept for reuse.
    pool: Vec<ShardGroup<T>>,
}

#[derive(Debug)]
struct TsdbInner<T> {
    topology: RwLock<Topology<T>>,
    closed: AtomicBool,
    bucket: i64,
    config: TsdbConfig,
}

impl<T> TsdbInner<T> {
    /// Position in `active` of the group whose window contains `t`, binding a pooled or
    /// new group to that window if none does.
    fn shard_group_for(&self, topology: &mut Topology<T>, t: Timestamp) -> usize {
        if let Some(pos) = topology.active.iter().position(|g| g.contains(t)) {
            return pos;
        }

        let (group, reused) = match topology.pool.pop() {
            Some(mut group) => {
                group.init_time(t, self.bucket);
                (group, true)
            }
            None => (
                ShardGroup::new(t, self.bucket, self.config.partition_count),
                false,
            ),
        };
        self.config.event_listener.on_event(DbEvent::ShardGroupCreated {
            min: group.min(),
            max: group.max(),
            reused,
        });
        topology.active.push(group);
        topology.active.len() - 1
    }
}

impl<T: Send + Sync> TsdbInner<T> {
    /// Evicts everything older than `cutoff`. Groups whose whole window lies before the
    /// cutoff are reset and pooled; the rest are swept partition by partition.
    fn remove_before(&self, cutoff: Timestamp) -> Result<SweepReport, DbError> {
        let mut guard = self.topology.write()?;
        let topology = &mut *guard;

        let mut report = SweepReport {
            cutoff,
            ..SweepReport::default()
        };
        let mut first_err = None;
        let groups = std::mem::take(&mut topology.active);
        let mut kept = Vec::with_capacity(groups.len());

        for group in groups {
            if group.expired_by(cutoff) {
                let retired = group.shard().stats().and_then(|stats| {
                    group.retire()?;
                    Ok(stats)
                });
                match retired {
                    Ok(stats) => {
                        report.evicted_values += stats.values;
                        report.dropped_series += stats.series;
                        report.retired_groups += 1;
                        self.config.event_listener.on_event(DbEvent::ShardGroupRetired {
                            min: group.min(),
                            max: group.max(),
                        });
                        topology.pool.push(group);
                    }
                    Err(e) => {
                        first_err.get_or_insert(e);
                        kept.push(group);
                    }
                }
            } else {
                match group.shard().remove_before(cutoff) {
                    Ok(eviction) => {
                        report.evicted_values += eviction.values;
                        report.dropped_series += eviction.series;
                    }
                    Err(e) => {
                        first_err.get_or_insert(e);
                    }
                }
                kept.push(group);
            }
        }
        topology.active = kept;
        db_metrics::record_shard_groups(topology.active.len(), topology.pool.len());

        match first_err {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }
}

impl<T: Send + Sync + 'static> RetentionTarget for TsdbInner<T> {
    fn sweep(&self, cutoff: Timestamp) -> Result<SweepReport, DbError> {
        self.remove_before(cutoff)
    }
}

/// The time-windowed storage engine.
///
/// Points are routed to the shard group whose `[min, max)` window contains their timestamp;
/// groups are created (or taken from the pool) on demand. A background thread evicts data
/// older than the retention window until [`Tsdb::stop`] is called or the engine is dropped.
///
/// ```
/// use shardtsdb::{Point, Tag, Tsdb};
/// use std::time::Duration;
///
/// let db: Tsdb<f64> = Tsdb::new(Duration::from_secs(3600)).unwrap();
/// db.insert_points(vec![Point::new(vec![Tag::new("host", "a")], 1_000, 0.5)]).unwrap();
/// let values = db.query(&Tag::new("host", "a"), 0..=2_000).unwrap();
/// assert_eq!(values.len(), 1);
/// ```
#[derive(Debug)]
pub struct Tsdb<T> {
    inner: Arc<TsdbInner<T>>,
    retention: RetentionWorker,
}

impl<T: Clone + Send + Sync + 'static> Tsdb<T> {
    /// Creates an engine with default settings and the given retention, and starts its
    /// retention thread. The thread sweeps once per retention period.
    pub fn new(retention: Duration) -> Result<Self, DbError> {
        Self::with_config(TsdbConfig::with_retention(retention))
    }

    /// Creates an engine from `config` and starts its retention thread.
    ///
    /// # Errors
    /// Returns `ConfigError` for invalid settings and `BackgroundTaskError` if the
    /// retention thread cannot be spawned.
    pub fn with_config(config: TsdbConfig) -> Result<Self, DbError> {
        config.validate()?;

        let inner = Arc::new(TsdbInner {
            topology: RwLock::new(Topology {
                active: Vec::new(),
                pool: Vec::new(),
            }),
            closed: AtomicBool::new(false),
            bucket: duration_to_nanos(config.shard_group_duration),
            config,
        });

        let retention = RetentionWorker::spawn(
            inner.clone(),
            inner.config.retention,
            inner.config.retention_check_interval,
            inner.config.clock.clone(),
            inner.config.event_listener.clone(),
        )?;

        Ok(Tsdb { inner, retention })
    }

    /// Inserts a batch of points.
    ///
    /// The batch is validated up front: if any point has no tags, nothing is written and
    /// `PointMissingTag` names the first offending point.
    ///
    /// # Errors
    /// `EngineClosed` after [`Tsdb::stop`], `PointMissingTag` for untagged points.
    pub fn insert_points(&self, points: Vec<Point<T>>) -> Result<(), DbError> {
        if self.is_closed() {
            return Err(DbError::EngineClosed);
        }
        if let Some(index) = points.iter().position(|p| p.tags.is_empty()) {
            return Err(DbError::PointMissingTag { index });
        }

        let count = points.len() as u64;
        let keyer = &self.inner.config.series_keyer;

        let mut guard = self.inner.topology.write()?;
        let topology = &mut *guard;
        for point in points {
            let key = keyer.series_key(&point.tags);
            let pos = self.inner.shard_group_for(topology, point.time);
            let Point { tags, time, field } = point;
            topology.active[pos]
                .shard()
                .write(&key, &tags, vec![Value::new(time, field)])?;
        }
        db_metrics::record_shard_groups(topology.active.len(), topology.pool.len());
        drop(guard);

        db_metrics::record_ingest_points(count);
        Ok(())
    }

    /// Returns the values of every series tagged `tag` with a timestamp inside `range`
    /// (both ends inclusive).
    ///
    /// Groups are visited in creation order and their results concatenated; within a group,
    /// each series contributes its values in insertion order. There is no global time
    /// ordering. Unknown tags and empty ranges yield an empty result.
    pub fn query(&self, tag: &Tag, range: RangeInclusive<Timestamp>) -> Result<Vec<Value<T>>, DbError> {
        let started = Instant::now();
        let (min, max) = (*range.start(), *range.end());

        let per_group = {
            let topology = self.inner.topology.read()?;
            let selected: Vec<&ShardGroup<T>> =
                topology.active.iter().filter(|g| g.have(min, max)).collect();
            let per_group: Vec<Vec<Value<T>>> = selected
                .par_iter()
                .map(|g| g.shard().query(tag, min, max))
                .collect::<Result<_, _>>()?;
            per_group
        };

        db_metrics::record_query(started.elapsed());
        Ok(per_group.into_iter().flatten().collect())
    }

    /// Asks the retention thread to sweep now and waits for the result.
    pub fn sweep_now(&self) -> Result<SweepReport, DbError> {
        if self.is_closed() || !self.retention.is_running() {
            return Err(DbError::EngineClosed);
        }
        self.retention.sweep_now()
    }

    /// Evicts everything older than `cutoff` on the calling thread.
    pub fn remove_before(&self, cutoff: Timestamp) -> Result<SweepReport, DbError> {
        self.inner.remove_before(cutoff)
    }

    /// Empties all shard groups and their indexes. Groups go to the pool, so the next
    /// insert behaves as on a fresh engine while reusing their allocations.
    pub fn clear(&self) -> Result<(), DbError> {
        let mut guard = self.inner.topology.write()?;
        let topology = &mut *guard;
        let groups = std::mem::take(&mut topology.active);
        for group in groups {
            group.retire()?;
            topology.pool.push(group);
        }
        db_metrics::record_shard_groups(0, topology.pool.len());
        Ok(())
    }

    pub fn stats(&self) -> Result<TsdbStats, DbError> {
        let topology = self.inner.topology.read()?;
        let mut stats = TsdbStats {
            active_shard_groups: topology.active.len(),
            pooled_shard_groups: topology.pool.len(),
            ..TsdbStats::default()
        };
        for group in &topology.active {
            let shard = group.shard().stats()?;
            stats.series += shard.series;
            stats.values += shard.values;
        }
        Ok(stats)
    }

    /// `[min, max)` of every active shard group, in query order.
    pub fn shard_group_windows(&self) -> Result<Vec<(Timestamp, Timestamp)>, DbError> {
        let topology = self.inner.topology.read()?;
        Ok(topology.active.iter().map(|g| g.window()).collect())
    }

    /// Returns a reference to the configuration the engine was built with.
    pub fn get_config(&self) -> &TsdbConfig {
        &self.inner.config
    }
}

impl<T> Tsdb<T> {
    /// Stops the retention thread and closes the engine. Later writes fail with
    /// `EngineClosed`; queries keep working on the data that is left. There is no reopen.
    pub fn stop(&self) -> Result<(), DbError> {
        let result = self.retention.stop();
        self.inner.closed.store(true, Ordering::SeqCst);
        result
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

/// Implement Drop to shut down the retention thread.
impl<T> Drop for Tsdb<T> {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
