use crate::error::DbError;
use crate::index::Index;
use crate::partition::{partition_index, Eviction, Partition};
use crate::types::{Tag, Timestamp, Value};
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::RwLock;

/// Series and value counts of a shard.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ShardStats {
    pub series: usize,
    pub values: usize,
}

/// A fixed ring of partitions plus the tag index of the series stored in them.
///
/// All partitions are allocated up front; a series always lands in the partition picked
/// by the hash of its key, so the mapping never changes for the lifetime of the shard.
#[derive(Debug)]
pub struct Shard<T> {
    partitions: Vec<Partition<T>>,
    index: RwLock<Index>,
}

impl<T> Shard<T> {
    /// Creates a shard with `partition_count` partitions (at least one).
    pub fn new(partition_count: usize) -> Self {
        let partitions = (0..partition_count.max(1)).map(|_| Partition::new()).collect();
        Self {
            partitions,
            index: RwLock::new(Index::new()),
        }
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Position of the partition owning `key`.
    #[inline]
    pub fn partition_index(&self, key: &str) -> usize {
        partition_index(key, self.partitions.len())
    }

    /// The partition owning `key`.
    #[inline]
    pub fn get_partition(&self, key: &str) -> &Partition<T> {
        &self.partitions[self.partition_index(key)]
    }

    /// Registers the tags of series `key` in the index.
    pub fn index_series(&self, key: &str, tags: &[Tag]) -> Result<bool, DbError> {
        let mut index = self.index.write()?;
        Ok(index.create_series_if_not_exists(key, tags))
    }

    /// Indexes series `key` and appends `values` to it.
    pub fn write(&self, key: &str, tags: &[Tag], values: Vec<Value<T>>) -> Result<(), DbError> {
        self.index_series(key, tags)?;
        self.get_partition(key).write(key, values)
    }

    /// Writes batches that are already grouped by series key, one partition call per series.
    /// The caller is responsible for indexing the series.
    pub fn write_multi(&self, batch: HashMap<String, Vec<Value<T>>>) -> Result<(), DbError> {
        for (key, values) in batch {
            if values.is_empty() {
                continue;
            }
            self.get_partition(&key).write(&key, values)?;
        }
        Ok(())
    }

    /// Series keys carrying `tag`, in key order.
    pub fn series_for(&self, tag: &Tag) -> Result<Vec<String>, DbError> {
        Ok(self.index.read()?.series_for(tag))
    }

    /// Every value seen for the tag key `key`.
    pub fn tag_values(&self, key: &str) -> Result<Vec<String>, DbError> {
        Ok(self.index.read()?.tag_values(key))
    }

    /// Drops all index entries and series but keeps the partition ring allocated.
    pub fn reset(&self) -> Result<(), DbError> {
        self.index.write()?.clear();
        for partition in &self.partitions {
            partition.clear()?;
        }
        Ok(())
    }

    /// True if no partition holds a series and the index is empty.
    pub fn is_empty(&self) -> Result<bool, DbError> {
        for partition in &self.partitions {
            if !partition.is_empty()? {
                return Ok(false);
            }
        }
        Ok(self.index.read()?.is_empty())
    }

    pub fn index_is_empty(&self) -> Result<bool, DbError> {
        Ok(self.index.read()?.is_empty())
    }

    pub fn stats(&self) -> Result<ShardStats, DbError> {
        let mut stats = ShardStats::default();
        for partition in &self.partitions {
            stats.series += partition.len()?;
            stats.values += partition.value_count()?;
        }
        Ok(stats)
    }
}

impl<T: Send + Sync> Shard<T> {
    /// Evicts values older than `unix_nano` from every partition.
    pub fn remove_before(&self, unix_nano: Timestamp) -> Result<Eviction, DbError> {
        let per_partition: Vec<Eviction> = self
            .partitions
            .par_iter()
            .map(|p| p.remove_before(unix_nano))
            .collect::<Result<_, _>>()?;
        let mut total = Eviction::default();
        for e in per_partition {
            total += e;
        }
        Ok(total)
    }
}

impl<T: Clone> Shard<T> {
    /// Values of series `key` with `min <= timestamp <= max`.
    pub fn values_between(
        &self,
        key: &str,
        min: Timestamp,
        max: Timestamp,
    ) -> Result<Vec<Value<T>>, DbError> {
        self.get_partition(key).values_between(key, min, max)
    }

    /// Values of every series carrying `tag` with `min <= timestamp <= max`.
    ///
    /// Series are visited in index order; each series contributes its values in insertion
    /// order.
    pub fn query(&self, tag: &Tag, min: Timestamp, max: Timestamp) -> Result<Vec<Value<T>>, DbError> {
        let series = self.series_for(tag)?;
        let mut out = Vec::new();
        for key in &series {
            out.extend(self.values_between(key, min, max)?);
        }
        Ok(out)
    }
}
