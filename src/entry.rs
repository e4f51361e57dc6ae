use crate::error::DbError;
use crate::types::{Timestamp, Value};
use std::sync::RwLock;

/// Append-only value log for exactly one series.
///
/// Each entry carries its own lock so that writers on different series never contend.
/// Values are kept in insertion order; reads always scan the whole log.
#[derive(Debug, Default)]
pub struct Entry<T> {
    values: RwLock<Vec<Value<T>>>,
}

impl<T> Entry<T> {
    /// Builds an entry that owns the given values.
    pub fn new(values: Vec<Value<T>>) -> Self {
        Self {
            values: RwLock::new(values),
        }
    }

    /// Appends values to the log.
    pub fn add(&self, values: Vec<Value<T>>) -> Result<(), DbError> {
        let mut guard = self.values.write()?;
        guard.extend(values);
        Ok(())
    }

    /// Drops every value with a timestamp strictly below `unix_nano` and returns how many
    /// were dropped.
    ///
    /// The log is rebuilt with a capacity equal to its previous length, so an entry that was
    /// already empty before this call ends up with zero capacity. The owning partition uses
    /// that to recognise series that have stayed cold for a whole retention cycle.
    pub fn remove_before(&self, unix_nano: Timestamp) -> Result<usize, DbError> {
        let mut guard = self.values.write()?;
        let before = guard.len();
        let mut kept = Vec::with_capacity(before);
        kept.extend(guard.drain(..).filter(|v| v.unix_nano >= unix_nano));
        let removed = before - kept.len();
        *guard = kept;
        Ok(removed)
    }

    /// Capacity of the backing log.
    pub fn capacity(&self) -> Result<usize, DbError> {
        Ok(self.values.read()?.capacity())
    }

    pub fn len(&self) -> Result<usize, DbError> {
        Ok(self.values.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, DbError> {
        Ok(self.values.read()?.is_empty())
    }
}

impl<T: Clone> Entry<T> {
    /// Returns a fresh copy of all values with `min <= timestamp <= max`, in insertion order.
    pub fn values_between(&self, min: Timestamp, max: Timestamp) -> Result<Vec<Value<T>>, DbError> {
        let guard = self.values.read()?;
        Ok(guard
            .iter()
            .filter(|v| v.unix_nano >= min && v.unix_nano <= max)
            .cloned()
            .collect())
    }
}
