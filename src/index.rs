//! Tag index: inverted mapping from a tag (key, value) pair to the series carrying it.

use crate::types::Tag;
use std::collections::{BTreeSet, HashMap};

/// Inverted index `tag key -> tag value -> series keys`.
///
/// Series sets are ordered so that lookups return series in a stable order. The index only
/// grows on insert; it is emptied wholesale when its shard is cleared or retired.
#[derive(Debug, Default, Clone)]
pub struct Index {
    tags: HashMap<String, HashMap<String, BTreeSet<String>>>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `series` carries `tag`. Returns `true` if the pair was new.
    pub fn update(&mut self, series: &str, tag: &Tag) -> bool {
        self.tags
            .entry(tag.key.clone())
            .or_default()
            .entry(tag.value.clone())
            .or_default()
            .insert(series.to_string())
    }

    /// Registers every tag of a series. Returns `true` if any (tag, series) pair was new.
    pub fn create_series_if_not_exists(&mut self, series: &str, tags: &[Tag]) -> bool {
        let mut created = false;
        for tag in tags {
            created |= self.update(series, tag);
        }
        created
    }

    /// Returns a copy of the series keys carrying `tag`, in key order.
    pub fn series_for(&self, tag: &Tag) -> Vec<String> {
        self.tags
            .get(&tag.key)
            .and_then(|values| values.get(&tag.value))
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns a copy of every value seen for the tag key `key`, sorted.
    pub fn tag_values(&self, key: &str) -> Vec<String> {
        let mut values: Vec<String> = self
            .tags
            .get(key)
            .map(|values| values.keys().cloned().collect())
            .unwrap_or_default();
        values.sort();
        values
    }

    /// Drops all entries, keeping the top-level map allocation.
    pub fn clear(&mut self) {
        self.tags.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Number of distinct tag keys.
    pub fn len(&self) -> usize {
        self.tags.len()
    }
}
