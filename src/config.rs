//! Engine configuration and its serde file layer.

use crate::error::DbError;
use crate::partition::DEFAULT_PARTITION_COUNT;
use crate::series::{canonical_series_keyer, SeriesKeyer};
use crate::telemetry::{noop_event_listener, DbEventListener};
use crate::utils::{system_clock, Clock};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Default retention window (1 hour).
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(60 * 60);
/// Default width of a shard group's time window (1 minute).
pub const DEFAULT_SHARD_GROUP_DURATION: Duration = Duration::from_secs(60);

/// Configuration options for [`crate::Tsdb`] and [`crate::SeriesStore`].
#[derive(Debug, Clone)]
pub struct TsdbConfig {
    /// Maximum age of data kept in memory.
    pub retention: Duration,
    /// How often the retention thread sweeps. Equal to `retention` unless overridden.
    pub retention_check_interval: Duration,
    /// Width of each shard group's `[min, max)` window.
    pub shard_group_duration: Duration,
    /// Number of partitions per shard.
    pub partition_count: usize,
    /// Series key derivation.
    pub series_keyer: Arc<dyn SeriesKeyer>,
    /// Time source for retention cutoffs.
    pub clock: Arc<dyn Clock>,
    /// Structured event hook for observability (no-op by default).
    pub event_listener: Arc<dyn DbEventListener>,
}

impl Default for TsdbConfig {
    fn default() -> Self {
        TsdbConfig {
            retention: DEFAULT_RETENTION,
            retention_check_interval: DEFAULT_RETENTION,
            shard_group_duration: DEFAULT_SHARD_GROUP_DURATION,
            partition_count: DEFAULT_PARTITION_COUNT,
            series_keyer: canonical_series_keyer(),
            clock: system_clock(),
            event_listener: noop_event_listener(),
        }
    }
}

impl TsdbConfig {
    /// Default configuration with the given retention; the sweep interval follows it.
    pub fn with_retention(retention: Duration) -> Self {
        TsdbConfig {
            retention,
            retention_check_interval: retention,
            ..TsdbConfig::default()
        }
    }

    pub fn validate(&self) -> Result<(), DbError> {
        if self.retention.is_zero() {
            return Err(DbError::ConfigError("retention must be greater than zero".to_string()));
        }
        if self.retention_check_interval.is_zero() {
            return Err(DbError::ConfigError(
                "retention_check_interval must be greater than zero".to_string(),
            ));
        }
        if self.shard_group_duration.is_zero() {
            return Err(DbError::ConfigError(
                "shard_group_duration must be greater than zero".to_string(),
            ));
        }
        if self.partition_count == 0 {
            return Err(DbError::ConfigError(
                "partition_count must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Engine settings as read from a host's config file. Every field is optional so the
/// file can be layered over defaults.
///
/// ```toml
/// retention_secs = 3600
/// shard_group_duration_secs = 60
/// partition_count = 16
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TsdbFileConfig {
    pub retention_secs: Option<u64>,
    /// Defaults to `retention_secs` when only the retention is given.
    pub retention_check_interval_secs: Option<u64>,
    pub shard_group_duration_secs: Option<u64>,
    pub partition_count: Option<usize>,
}

impl TsdbFileConfig {
    /// Applies the set fields on top of `base` and validates the result.
    pub fn apply_to(&self, mut base: TsdbConfig) -> Result<TsdbConfig, DbError> {
        if let Some(secs) = self.retention_secs {
            base.retention = Duration::from_secs(secs);
            base.retention_check_interval = base.retention;
        }
        if let Some(secs) = self.retention_check_interval_secs {
            base.retention_check_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = self.shard_group_duration_secs {
            base.shard_group_duration = Duration::from_secs(secs);
        }
        if let Some(n) = self.partition_count {
            base.partition_count = n;
        }
        base.validate()?;
        Ok(base)
    }
}
