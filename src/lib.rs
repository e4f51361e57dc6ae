#![doc = include_str!("../README.md")]
// Declare modules
pub mod config;
pub mod core;
pub mod entry;
pub mod error;
pub mod index;
pub mod partition;
pub(crate) mod retention;
pub mod series;
pub mod shard;
pub mod shard_group;
pub mod store;
pub mod telemetry;
pub mod types;
pub mod utils;

/// Configuration options for the engines.
pub use crate::config::{TsdbConfig, TsdbFileConfig};
/// Time-windowed storage engine and its statistics.
pub use crate::core::{Tsdb, TsdbStats};
/// Per-series value container.
pub use crate::entry::Entry;
/// Error type for engine operations.
pub use crate::error::DbError;
/// Tag to series inverted index.
pub use crate::index::Index;
/// Lock-striped series map.
pub use crate::partition::{Eviction, Partition};
/// Outcome of a retention sweep.
pub use crate::retention::SweepReport;
/// Series key derivation.
pub use crate::series::{CanonicalSeriesKeyer, SeriesKey, SeriesKeyer};
/// Partitioned storage unit with its own index.
pub use crate::shard::{Shard, ShardStats};
/// A shard bound to a time window.
pub use crate::shard_group::ShardGroup;
/// Single-shard engine with batched writes.
pub use crate::store::SeriesStore;
/// Structured event hook for observability.
pub use crate::telemetry::{DbEvent, DbEventListener, TracingEventListener};
/// Core data types.
pub use crate::types::{Point, Tag, Timestamp, Value};
/// Clocks used for retention cutoffs.
pub use crate::utils::{Clock, ManualClock, SystemClock};
