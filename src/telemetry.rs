use std::sync::Arc;

#[cfg(feature = "prometheus")]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(feature = "prometheus")]
use std::sync::Mutex;
#[cfg(feature = "prometheus")]
use std::thread::JoinHandle;
use std::time::Duration;

use crate::types::Timestamp;

/// Structured, in-process event hook for observability.
///
/// This crate is a library; emitting logs directly (e.g. `println!`) is not acceptable for
/// production. Instead, callers can provide an implementation that forwards these events to
/// `tracing`, metrics, or custom sinks. [`TracingEventListener`] covers the common case.
pub trait DbEventListener: std::fmt::Debug + Send + Sync + 'static {
    fn on_event(&self, event: DbEvent);
}

/// Structured events emitted by the engines.
#[derive(Debug, Clone, PartialEq)]
pub enum DbEvent {
    RetentionThreadStarted,
    RetentionThreadStopping,
    RetentionThreadPanicked,

    RetentionSwept {
        cutoff: Timestamp,
        evicted_values: usize,
        dropped_series: usize,
        retired_groups: usize,
    },
    RetentionSweepFailed {
        cutoff: Timestamp,
        error: String,
    },

    ShardGroupCreated {
        min: Timestamp,
        max: Timestamp,
        reused: bool,
    },
    ShardGroupRetired {
        min: Timestamp,
        max: Timestamp,
    },
}

#[derive(Debug)]
pub struct NoopEventListener;

impl DbEventListener for NoopEventListener {
    #[inline]
    fn on_event(&self, _event: DbEvent) {}
}

pub fn noop_event_listener() -> Arc<dyn DbEventListener> {
    Arc::new(NoopEventListener)
}

/// Forwards engine events to `tracing` with structured fields.
#[derive(Debug, Default)]
pub struct TracingEventListener;

impl DbEventListener for TracingEventListener {
    fn on_event(&self, event: DbEvent) {
        match event {
            DbEvent::RetentionThreadStarted => tracing::debug!("retention thread started"),
            DbEvent::RetentionThreadStopping => tracing::debug!("retention thread stopping"),
            DbEvent::RetentionThreadPanicked => tracing::error!("retention thread panicked"),
            DbEvent::RetentionSwept {
                cutoff,
                evicted_values,
                dropped_series,
                retired_groups,
            } => tracing::debug!(
                cutoff,
                evicted_values,
                dropped_series,
                retired_groups,
                "retention sweep completed"
            ),
            DbEvent::RetentionSweepFailed { cutoff, error } => {
                tracing::warn!(cutoff, %error, "retention sweep failed")
            }
            DbEvent::ShardGroupCreated { min, max, reused } => {
                tracing::trace!(min, max, reused, "shard group created")
            }
            DbEvent::ShardGroupRetired { min, max } => {
                tracing::trace!(min, max, "shard group retired")
            }
        }
    }
}

pub fn tracing_event_listener() -> Arc<dyn DbEventListener> {
    Arc::new(TracingEventListener)
}

/// Metrics instrumentation and in-process scraping.
///
/// ## Key properties
/// - Library-safe: emitting metrics is effectively a no-op until a recorder is installed.
/// - Serverless scraping: callers can render Prometheus exposition text in-process.
pub mod db_metrics {
    use super::*;

    use ::metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

    #[cfg(feature = "prometheus")]
    use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

    // --- metric names ---
    //
    // Notes:
    // - Counters are exposed as `<name>_total` by the Prometheus exporter.
    // - Histograms are exposed as `<name>_bucket`, `<name>_sum`, `<name>_count`.

    pub const INGEST_POINTS: &str = "shardtsdb_ingest_points";
    pub const QUERY_DURATION_SECONDS: &str = "shardtsdb_query_duration_seconds";

    pub const RETENTION_SWEEP_DURATION_SECONDS: &str = "shardtsdb_retention_sweep_duration_seconds";
    pub const RETENTION_EVICTED_VALUES: &str = "shardtsdb_retention_evicted_values";

    pub const ACTIVE_SHARD_GROUPS: &str = "shardtsdb_active_shard_groups";
    pub const POOLED_SHARD_GROUPS: &str = "shardtsdb_pooled_shard_groups";

    /// Handle to the in-process Prometheus recorder/scrape renderer.
    ///
    /// This does **not** start an HTTP server. Call [`InProcessPrometheus::render`] to scrape.
    #[cfg(feature = "prometheus")]
    #[derive(Debug)]
    pub struct InProcessPrometheus {
        handle: PrometheusHandle,
        stop: Arc<AtomicBool>,
        upkeep_thread: Mutex<Option<JoinHandle<()>>>,
    }

    #[cfg(feature = "prometheus")]
    impl InProcessPrometheus {
        /// Installs a global Prometheus recorder (once per process) and starts a small upkeep thread.
        ///
        /// The upkeep thread periodically calls `run_upkeep()` to keep histogram buckets bounded.
        pub fn install(upkeep_interval: Duration) -> Result<Self, MetricsInitError> {
            describe_all();

            let handle = PrometheusBuilder::new()
                .install_recorder()
                .map_err(MetricsInitError::from_build_error)?;

            let stop = Arc::new(AtomicBool::new(false));
            let stop_clone = stop.clone();
            let handle_clone = handle.clone();
            let upkeep_thread = std::thread::Builder::new()
                .name("shardtsdb-metrics-upkeep".to_string())
                .spawn(move || {
                    while !stop_clone.load(Ordering::Relaxed) {
                        std::thread::sleep(upkeep_interval);
                        handle_clone.run_upkeep();
                    }
                })
                .map_err(|e| MetricsInitError::ThreadSpawn(e.to_string()))?;

            Ok(Self {
                handle,
                stop,
                upkeep_thread: Mutex::new(Some(upkeep_thread)),
            })
        }

        /// Renders the current metrics in the Prometheus text exposition format.
        pub fn render(&self) -> String {
            self.handle.render()
        }
    }

    #[cfg(feature = "prometheus")]
    impl Drop for InProcessPrometheus {
        fn drop(&mut self) {
            self.stop.store(true, Ordering::Relaxed);
            if let Ok(mut guard) = self.upkeep_thread.lock() {
                if let Some(t) = guard.take() {
                    let _ = t.join();
                }
            }
        }
    }

    #[cfg(feature = "prometheus")]
    #[derive(Debug, thiserror::Error)]
    pub enum MetricsInitError {
        #[error("metrics recorder already installed")]
        AlreadyInstalled,
        #[error("failed to install prometheus recorder: {0}")]
        Install(String),
        #[error("failed to spawn upkeep thread: {0}")]
        ThreadSpawn(String),
    }

    #[cfg(feature = "prometheus")]
    impl MetricsInitError {
        fn from_build_error(e: BuildError) -> Self {
            match e {
                BuildError::FailedToSetGlobalRecorder(_) => MetricsInitError::AlreadyInstalled,
                other => MetricsInitError::Install(other.to_string()),
            }
        }
    }

    #[inline]
    pub fn record_ingest_points(points: u64) {
        if points > 0 {
            ::metrics::counter!(INGEST_POINTS).increment(points);
        }
    }

    #[inline]
    pub fn record_query(duration: Duration) {
        ::metrics::histogram!(QUERY_DURATION_SECONDS).record(duration.as_secs_f64());
    }

    #[inline]
    pub fn record_retention_sweep(duration: Duration, evicted_values: u64) {
        ::metrics::histogram!(RETENTION_SWEEP_DURATION_SECONDS).record(duration.as_secs_f64());
        if evicted_values > 0 {
            ::metrics::counter!(RETENTION_EVICTED_VALUES).increment(evicted_values);
        }
    }

    #[inline]
    pub fn record_shard_groups(active: usize, pooled: usize) {
        ::metrics::gauge!(ACTIVE_SHARD_GROUPS).set(active as f64);
        ::metrics::gauge!(POOLED_SHARD_GROUPS).set(pooled as f64);
    }

    fn describe_all() {
        // Counters
        describe_counter!(
            INGEST_POINTS,
            Unit::Count,
            "Total number of points accepted by insert/write calls."
        );
        describe_counter!(
            RETENTION_EVICTED_VALUES,
            Unit::Count,
            "Total number of values evicted by retention."
        );

        // Histograms
        describe_histogram!(
            QUERY_DURATION_SECONDS,
            Unit::Seconds,
            "Time spent answering tag/range queries."
        );
        describe_histogram!(
            RETENTION_SWEEP_DURATION_SECONDS,
            Unit::Seconds,
            "Duration of one retention sweep."
        );

        // Gauges
        describe_gauge!(
            ACTIVE_SHARD_GROUPS,
            Unit::Count,
            "Shard groups currently bound to a time window."
        );
        describe_gauge!(
            POOLED_SHARD_GROUPS,
            Unit::Count,
            "Retired shard groups waiting for reuse."
        );
    }
}
