//! Background retention: one thread per engine that periodically evicts expired data.

use crate::error::DbError;
use crate::telemetry::{db_metrics, DbEvent, DbEventListener};
use crate::types::Timestamp;
use crate::utils::{duration_to_nanos, Clock};

use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// What one retention sweep did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Values with a timestamp below this were evicted.
    pub cutoff: Timestamp,
    pub evicted_values: usize,
    /// Series entries removed from their partitions.
    pub dropped_series: usize,
    /// Shard groups moved to the reuse pool.
    pub retired_groups: usize,
}

/// Storage that the retention thread sweeps.
pub(crate) trait RetentionTarget: Send + Sync + 'static {
    fn sweep(&self, cutoff: Timestamp) -> Result<SweepReport, DbError>;
}

/// Commands sent to the retention thread.
enum RetentionCommand {
    Sweep {
        ack: mpsc::Sender<Result<SweepReport, DbError>>,
    },
    Shutdown,
}

/// Handle to a running retention thread.
///
/// The thread wakes every `interval`, computes `cutoff = now - retention` and sweeps its
/// target. It exits when it receives the shutdown command or when the handle is dropped.
#[derive(Debug)]
pub(crate) struct RetentionWorker {
    cmd_tx: mpsc::Sender<RetentionCommand>,
    handle: Mutex<Option<JoinHandle<()>>>,
    events: Arc<dyn DbEventListener>,
}

impl RetentionWorker {
    pub(crate) fn spawn(
        target: Arc<dyn RetentionTarget>,
        retention: Duration,
        interval: Duration,
        clock: Arc<dyn Clock>,
        events: Arc<dyn DbEventListener>,
    ) -> Result<Self, DbError> {
        let (cmd_tx, cmd_rx) = mpsc::channel::<RetentionCommand>();
        let retention_ns = duration_to_nanos(retention);
        let thread_events = events.clone();

        let handle = thread::Builder::new()
            .name("shardtsdb-retention".to_string())
            .spawn(move || {
                let events = thread_events;
                events.on_event(DbEvent::RetentionThreadStarted);

                let run_sweep = || -> Result<SweepReport, DbError> {
                    let cutoff = clock.now().saturating_sub(retention_ns);
                    let started = Instant::now();
                    match target.sweep(cutoff) {
                        Ok(report) => {
                            db_metrics::record_retention_sweep(
                                started.elapsed(),
                                report.evicted_values as u64,
                            );
                            events.on_event(DbEvent::RetentionSwept {
                                cutoff,
                                evicted_values: report.evicted_values,
                                dropped_series: report.dropped_series,
                                retired_groups: report.retired_groups,
                            });
                            Ok(report)
                        }
                        Err(e) => {
                            events.on_event(DbEvent::RetentionSweepFailed {
                                cutoff,
                                error: e.to_string(),
                            });
                            Err(e)
                        }
                    }
                };

                loop {
                    match cmd_rx.recv_timeout(interval) {
                        Err(mpsc::RecvTimeoutError::Timeout) => {
                            // Eviction is best-effort; failures are reported through events.
                            let _ = run_sweep();
                        }
                        Ok(RetentionCommand::Sweep { ack }) => {
                            let _ = ack.send(run_sweep());
                        }
                        Ok(RetentionCommand::Shutdown)
                        | Err(mpsc::RecvTimeoutError::Disconnected) => {
                            events.on_event(DbEvent::RetentionThreadStopping);
                            break;
                        }
                    }
                }
            })
            .map_err(|e| {
                DbError::BackgroundTaskError(format!("Failed to spawn retention thread: {}", e))
            })?;

        Ok(Self {
            cmd_tx,
            handle: Mutex::new(Some(handle)),
            events,
        })
    }

    /// Runs one sweep on the retention thread and waits for its report.
    pub(crate) fn sweep_now(&self) -> Result<SweepReport, DbError> {
        let (tx, rx) = mpsc::channel();
        self.cmd_tx
            .send(RetentionCommand::Sweep { ack: tx })
            .map_err(|e| DbError::BackgroundTaskError(format!("Failed to send sweep command: {}", e)))?;
        rx.recv()
            .map_err(|e| DbError::BackgroundTaskError(format!("Failed to receive sweep ack: {}", e)))?
    }

    /// Signals the thread to stop and joins it. Calling it again is a no-op.
    pub(crate) fn stop(&self) -> Result<(), DbError> {
        let handle = self.handle.lock()?.take();
        let Some(handle) = handle else {
            return Ok(());
        };

        // The thread may already be gone if it panicked; the join below reports that.
        let _ = self.cmd_tx.send(RetentionCommand::Shutdown);

        if handle.join().is_err() {
            self.events.on_event(DbEvent::RetentionThreadPanicked);
            return Err(DbError::BackgroundTaskError(
                "Retention thread panicked".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn is_running(&self) -> bool {
        self.handle.lock().map(|h| h.is_some()).unwrap_or(false)
    }
}
