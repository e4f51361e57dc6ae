use crate::entry::Entry;
use crate::error::DbError;
use crate::types::{Timestamp, Value};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use xxhash_rust::xxh64::xxh64;

/// Number of partitions in a shard unless configured otherwise.
pub const DEFAULT_PARTITION_COUNT: usize = 16;

/// Maps a series key onto one of `partition_count` buckets.
///
/// xxh64 (seed 0) is stable across runs and distributes uniformly; it has no
/// cryptographic role here.
#[inline]
pub fn partition_index(key: &str, partition_count: usize) -> usize {
    (xxh64(key.as_bytes(), 0) % partition_count as u64) as usize
}

/// Outcome of evicting old values from a partition.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Eviction {
    /// Values dropped from entries.
    pub values: usize,
    /// Entries dropped from the partition because they stayed empty.
    pub series: usize,
}

impl std::ops::AddAssign for Eviction {
    fn add_assign(&mut self, rhs: Self) {
        self.values += rhs.values;
        self.series += rhs.series;
    }
}

/// One bucket of a shard's hash ring.
///
/// The partition lock only guards which series exist; the values of a series sit behind
/// the lock of its [`Entry`]. Writes to known series therefore take the partition lock in
/// shared mode only.
#[derive(Debug, Default)]
pub struct Partition<T> {
    /// series key (e.g. `host=a,region=sh`) -> value log
    store: RwLock<HashMap<String, Arc<Entry<T>>>>,
}

impl<T> Partition<T> {
    pub fn new() -> Self {
        Self {
            store: RwLock::new(HashMap::new()),
        }
    }

    /// Appends values to the series `key`, creating its entry on first write.
    pub fn write(&self, key: &str, values: Vec<Value<T>>) -> Result<(), DbError> {
        // Common path: the series already exists. The read guard is held across the
        // append so a concurrent sweep cannot drop the entry in between.
        {
            let store = self.store.read()?;
            if let Some(entry) = store.get(key) {
                return entry.add(values);
            }
        }

        let mut store = self.store.write()?;
        // Another writer may have created the entry between the two locks.
        if let Some(entry) = store.get(key) {
            return entry.add(values);
        }
        store.insert(key.to_string(), Arc::new(Entry::new(values)));
        Ok(())
    }

    /// Evicts values older than `unix_nano` from every entry.
    ///
    /// Entries whose log has collapsed to zero capacity (empty at the previous sweep and not
    /// written since) are dropped from the partition altogether.
    pub fn remove_before(&self, unix_nano: Timestamp) -> Result<Eviction, DbError> {
        let mut store = self.store.write()?;
        let mut eviction = Eviction::default();
        let mut kept = HashMap::with_capacity(store.len());
        for (key, entry) in store.drain() {
            eviction.values += entry.remove_before(unix_nano)?;
            if entry.capacity()? != 0 {
                kept.insert(key, entry);
            } else {
                eviction.series += 1;
            }
        }
        *store = kept;
        Ok(eviction)
    }

    /// Drops every entry while keeping the map allocation for reuse.
    pub fn clear(&self) -> Result<(), DbError> {
        self.store.write()?.clear();
        Ok(())
    }

    /// Number of series held by this partition.
    pub fn len(&self) -> Result<usize, DbError> {
        Ok(self.store.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, DbError> {
        Ok(self.store.read()?.is_empty())
    }

    /// Total number of values across all entries.
    pub fn value_count(&self) -> Result<usize, DbError> {
        let entries: Vec<_> = self.store.read()?.values().cloned().collect();
        let mut total = 0;
        for entry in entries {
            total += entry.len()?;
        }
        Ok(total)
    }

    pub fn contains(&self, key: &str) -> Result<bool, DbError> {
        Ok(self.store.read()?.contains_key(key))
    }
}

impl<T: Clone> Partition<T> {
    /// Returns a copy of the values of series `key` with `min <= timestamp <= max`.
    /// Unknown series yield an empty result.
    pub fn values_between(
        &self,
        key: &str,
        min: Timestamp,
        max: Timestamp,
    ) -> Result<Vec<Value<T>>, DbError> {
        let entry = self.store.read()?.get(key).cloned();
        match entry {
            Some(entry) => entry.values_between(min, max),
            None => Ok(Vec::new()),
        }
    }
}
