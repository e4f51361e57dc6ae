//! Series identity: canonical series keys and the pluggable key derivation collaborator.

use crate::types::Tag;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Canonical series key: the sorted tag set of a point.
/// Tags are sorted by key then value so that two equivalent tag lists produce the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
    /// Sorted (k, v) pairs for deterministic ordering.
    tags_sorted: Vec<(String, String)>,
}

impl SeriesKey {
    /// Builds a canonical series key from a tag list. Exact duplicate tags collapse.
    pub fn new(tags: &[Tag]) -> Self {
        let mut tags_sorted: Vec<_> = tags
            .iter()
            .map(|t| (t.key.clone(), t.value.clone()))
            .collect();
        tags_sorted.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        tags_sorted.dedup();
        Self { tags_sorted }
    }

    pub fn is_empty(&self) -> bool {
        self.tags_sorted.is_empty()
    }
}

/// Renders as `k1=v1,k2=v2`.
impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.tags_sorted.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        Ok(())
    }
}

/// Derives the string key identifying the series a tag set belongs to.
///
/// Implementations must be deterministic and independent of tag order. The host
/// system may supply its own derivation; [`CanonicalSeriesKeyer`] is the default.
pub trait SeriesKeyer: fmt::Debug + Send + Sync + 'static {
    fn series_key(&self, tags: &[Tag]) -> String;
}

/// Default key derivation based on [`SeriesKey`].
#[derive(Debug, Default)]
pub struct CanonicalSeriesKeyer;

impl SeriesKeyer for CanonicalSeriesKeyer {
    #[inline]
    fn series_key(&self, tags: &[Tag]) -> String {
        SeriesKey::new(tags).to_string()
    }
}

pub fn canonical_series_keyer() -> Arc<dyn SeriesKeyer> {
    Arc::new(CanonicalSeriesKeyer)
}
