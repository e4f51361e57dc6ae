//! Single-shard engine without time windowing.
//!
//! All series live in one partitioned [`Shard`]. Writes are grouped by series before they
//! reach the shard, so each series costs one hash and one partition lookup per batch.

use crate::config::TsdbConfig;
use crate::error::DbError;
use crate::retention::{RetentionTarget, RetentionWorker, SweepReport};
use crate::shard::{Shard, ShardStats};
use crate::telemetry::db_metrics;
use crate::types::{Point, Tag, Timestamp, Value};

use std::collections::hash_map::Entry as MapEntry;
use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct StoreInner<T> {
    shard: Shard<T>,
    /// Shared by batch writes, exclusive for `clear`, so a clear never lands between
    /// indexing a batch and storing it.
    gate: RwLock<()>,
    closed: AtomicBool,
    config: TsdbConfig,
}

impl<T: Send + Sync + 'static> RetentionTarget for StoreInner<T> {
    fn sweep(&self, cutoff: Timestamp) -> Result<SweepReport, DbError> {
        let eviction = self.shard.remove_before(cutoff)?;
        Ok(SweepReport {
            cutoff,
            evicted_values: eviction.values,
            dropped_series: eviction.series,
            retired_groups: 0,
        })
    }
}

/// In-memory series store backed by a single shard, with background retention.
#[derive(Debug)]
pub struct SeriesStore<T> {
    inner: Arc<StoreInner<T>>,
    retention: RetentionWorker,
}

impl<T: Clone + Send + Sync + 'static> SeriesStore<T> {
    /// Creates a store with default settings and the given retention, and starts its
    /// retention thread.
    pub fn new(retention: Duration) -> Result<Self, DbError> {
        Self::with_config(TsdbConfig::with_retention(retention))
    }

    /// Creates a store from `config`. `shard_group_duration` is not used here.
    pub fn with_config(config: TsdbConfig) -> Result<Self, DbError> {
        config.validate()?;

        let inner = Arc::new(StoreInner {
            shard: Shard::new(config.partition_count),
            gate: RwLock::new(()),
            closed: AtomicBool::new(false),
            config,
        });

        let retention = RetentionWorker::spawn(
            inner.clone(),
            inner.config.retention,
            inner.config.retention_check_interval,
            inner.config.clock.clone(),
            inner.config.event_listener.clone(),
        )?;

        Ok(SeriesStore { inner, retention })
    }

    /// Writes a batch of points.
    ///
    /// Points are grouped by series key and every series of the batch is indexed before a
    /// single multi-series write. If any point has no tags the whole batch is rejected with
    /// nothing indexed or stored.
    pub fn write_points(&self, points: Vec<Point<T>>) -> Result<(), DbError> {
        if self.is_closed() {
            return Err(DbError::EngineClosed);
        }

        let count = points.len() as u64;
        let keyer = &self.inner.config.series_keyer;
        let mut batch: HashMap<String, Vec<Value<T>>> = HashMap::new();
        let mut new_series: Vec<(String, Vec<Tag>)> = Vec::new();

        for (index, point) in points.into_iter().enumerate() {
            if point.tags.is_empty() {
                return Err(DbError::PointMissingTag { index });
            }
            let key = keyer.series_key(&point.tags);
            let Point { tags, time, field } = point;
            let value = Value::new(time, field);
            match batch.entry(key) {
                MapEntry::Occupied(mut e) => e.get_mut().push(value),
                MapEntry::Vacant(e) => {
                    new_series.push((e.key().clone(), tags));
                    e.insert(vec![value]);
                }
            }
        }

        {
            let _gate = self.inner.gate.read()?;
            for (key, tags) in &new_series {
                self.inner.shard.index_series(key, tags)?;
            }
            self.inner.shard.write_multi(batch)?;
        }

        db_metrics::record_ingest_points(count);
        Ok(())
    }

    /// Values of every series tagged `tag` with a timestamp inside `range` (inclusive).
    pub fn query(&self, tag: &Tag, range: RangeInclusive<Timestamp>) -> Result<Vec<Value<T>>, DbError> {
        let started = Instant::now();
        let values = self.inner.shard.query(tag, *range.start(), *range.end())?;
        db_metrics::record_query(started.elapsed());
        Ok(values)
    }

    /// Values of the series identified by `series` inside `range` (inclusive).
    pub fn series_values(
        &self,
        series: &str,
        range: RangeInclusive<Timestamp>,
    ) -> Result<Vec<Value<T>>, DbError> {
        self.inner
            .shard
            .values_between(series, *range.start(), *range.end())
    }

    /// Every value recorded for the tag key `key`.
    pub fn tag_values(&self, key: &str) -> Result<Vec<String>, DbError> {
        self.inner.shard.tag_values(key)
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
        self.inner.sweep(cutoff)
    }

    /// Empties the store and its index. Waits for in-flight batches, so every series left
    /// after a concurrent write is both stored and indexed.
    pub fn clear(&self) -> Result<(), DbError> {
        let _gate = self.inner.gate.write()?;
        self.inner.shard.reset()
    }

    pub fn stats(&self) -> Result<ShardStats, DbError> {
        self.inner.shard.stats()
    }

    /// True when no series is stored and the index is empty.
    pub fn is_empty(&self) -> Result<bool, DbError> {
        self.inner.shard.is_empty()
    }

    /// Returns a reference to the configuration the store was built with.
    pub fn get_config(&self) -> &TsdbConfig {
        &self.inner.config
    }
}

impl<T> SeriesStore<T> {
    /// Stops the retention thread and closes the store for writes.
    pub fn stop(&self) -> Result<(), DbError> {
        let result = self.retention.stop();
        self.inner.closed.store(true, Ordering::SeqCst);
        result
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

impl<T> Drop for SeriesStore<T> {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(tags: &[(&str, &str)], t: Timestamp, v: f64) -> Point<f64> {
        Point::new(tags.iter().map(|(k, v)| Tag::new(*k, *v)).collect(), t, v)
    }

    fn store() -> SeriesStore<f64> {
        SeriesStore::new(Duration::from_secs(3600)).unwrap()
    }

    #[test]
    fn test_write_points_groups_by_series() {
        let store = store();
        store
            .write_points(vec![
                point(&[("host", "a")], 1, 1.0),
                point(&[("host", "b")], 2, 2.0),
                point(&[("host", "a")], 3, 3.0),
            ])
            .unwrap();

        assert_eq!(store.stats().unwrap(), ShardStats { series: 2, values: 3 });
        assert_eq!(
            store.series_values("host=a", 0..=10).unwrap(),
            vec![Value::new(1, 1.0), Value::new(3, 3.0)]
        );
        assert_eq!(store.tag_values("host").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_missing_tag_rejects_whole_batch() {
        let store = store();
        let err = store
            .write_points(vec![point(&[("host", "a")], 1, 1.0), point(&[], 2, 2.0)])
            .unwrap_err();
        assert!(matches!(err, DbError::PointMissingTag { index: 1 }));
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_query_by_tag() {
        let store = store();
        store
            .write_points(vec![
                point(&[("host", "a"), ("dc", "x")], 10, 1.0),
                point(&[("host", "b"), ("dc", "x")], 20, 2.0),
                point(&[("host", "c"), ("dc", "y")], 30, 3.0),
            ])
            .unwrap();

        let mut got = store.query(&Tag::new("dc", "x"), 0..=100).unwrap();
        got.sort_by_key(|v| v.unix_nano);
        assert_eq!(got, vec![Value::new(10, 1.0), Value::new(20, 2.0)]);
        assert!(store.query(&Tag::new("dc", "z"), 0..=100).unwrap().is_empty());
        assert!(store.query(&Tag::new("dc", "x"), 21..=100).unwrap().is_empty());
    }

    #[test]
    fn test_remove_before_and_clear() {
        let store = store();
        store
            .write_points(vec![point(&[("a", "b")], 1, 1.0), point(&[("a", "b")], 100, 2.0)])
            .unwrap();

        let report = store.remove_before(50).unwrap();
        assert_eq!(report.evicted_values, 1);
        assert_eq!(store.query(&Tag::new("a", "b"), 0..=1000).unwrap(), vec![Value::new(100, 2.0)]);

        store.clear().unwrap();
        assert!(store.is_empty().unwrap());
        assert!(store.query(&Tag::new("a", "b"), 0..=1000).unwrap().is_empty());
    }

    #[test]
    fn test_stop_rejects_writes() {
        let store = store();
        store.stop().unwrap();
        assert!(matches!(
            store.write_points(vec![point(&[("a", "b")], 1, 1.0)]),
            Err(DbError::EngineClosed)
        ));
    }
}
