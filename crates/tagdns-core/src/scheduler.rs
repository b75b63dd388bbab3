//! Periodic pass scheduler
//!
//! Runs one pass immediately, then one at the start of every period. Each
//! pass runs in its own task so a slow pass never delays the timer.
//!
//! What happens when a tick finds the previous pass still running depends
//! on the [`OverlapPolicy`]:
//!
//! - `Skip`: the tick is dropped with a warning
//! - `Concurrent`: another pass starts; passes may interleave reads and
//!   writes on the same names and rely on convergence to settle
//!
//! Shutdown stops the timer. Passes already in flight are not cancelled.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::IntervalStream;
use tracing::{debug, error, info, warn};

use crate::config::{OverlapPolicy, ScheduleConfig};
use crate::error::Result;
use crate::reconciler::Reconciler;

/// Shortest period the scheduler accepts
pub const MIN_PERIOD: Duration = Duration::from_secs(10);

/// Raise `requested` to [`MIN_PERIOD`] if it is shorter
pub fn clamp_period(requested: Duration) -> Duration {
    if requested < MIN_PERIOD {
        warn!(
            specified = ?requested,
            using = ?MIN_PERIOD,
            "Timer period set too low, increasing to 10 seconds"
        );
        MIN_PERIOD
    } else {
        requested
    }
}

/// Counters shared between a scheduler and its observers
#[derive(Debug, Clone, Default)]
pub struct SchedulerStats {
    started: Arc<AtomicUsize>,
    skipped: Arc<AtomicUsize>,
}

impl SchedulerStats {
    /// Passes started so far
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Ticks dropped because a pass was still running
    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::SeqCst)
    }
}

/// Marks a pass as in flight until dropped
struct PassGuard {
    busy: Arc<AtomicBool>,
}

impl PassGuard {
    fn try_acquire(busy: &Arc<AtomicBool>) -> Option<Self> {
        busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                busy: Arc::clone(busy),
            })
    }
}

impl Drop for PassGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Periodic driver of [`Reconciler::run_pass`]
pub struct Scheduler {
    reconciler: Arc<Reconciler>,
    period: Duration,
    overlap: OverlapPolicy,
    busy: Arc<AtomicBool>,
    stats: SchedulerStats,
}

impl Scheduler {
    /// Create a scheduler; the period is clamped to [`MIN_PERIOD`]
    pub fn new(reconciler: Arc<Reconciler>, schedule: &ScheduleConfig) -> Self {
        Self {
            reconciler,
            period: clamp_period(Duration::from_secs(schedule.period_secs)),
            overlap: schedule.overlap,
            busy: Arc::new(AtomicBool::new(false)),
            stats: SchedulerStats::default(),
        }
    }

    /// Effective period
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Handle to the pass counters
    pub fn stats(&self) -> SchedulerStats {
        self.stats.clone()
    }

    /// Run until Ctrl-C
    pub async fn run(&self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Run until `shutdown_rx` fires (or Ctrl-C when `None`)
    pub async fn run_with_shutdown(
        &self,
        shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }

    async fn run_internal(
        &self,
        shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<()> {
        info!(
            period = ?self.period,
            overlap = ?self.overlap,
            "Scheduler started"
        );

        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks = IntervalStream::new(interval);

        let shutdown = async move {
            match shutdown_rx {
                // A dropped sender also stops the scheduler
                Some(rx) => {
                    let _ = rx.await;
                }
                None => {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!("Failed to listen for Ctrl-C: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
        };
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                Some(_) = ticks.next() => self.trigger(),
                _ = &mut shutdown => {
                    info!("Shutdown signal received, no further passes will start");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Start one pass unless the overlap policy forbids it
    fn trigger(&self) {
        let guard = match self.overlap {
            OverlapPolicy::Skip => match PassGuard::try_acquire(&self.busy) {
                Some(guard) => Some(guard),
                None => {
                    warn!("Previous pass still running, skipping this tick");
                    self.stats.skipped.fetch_add(1, Ordering::SeqCst);
                    return;
                }
            },
            OverlapPolicy::Concurrent => None,
        };

        self.stats.started.fetch_add(1, Ordering::SeqCst);
        let reconciler = Arc::clone(&self.reconciler);
        tokio::spawn(async move {
            let _guard = guard;
            match reconciler.run_pass().await {
                Ok(report) => debug!(
                    discovered = report.discovered,
                    updates = report.updates.len(),
                    outcome = ?report.outcome,
                    "Pass finished"
                ),
                Err(e) => error!("Reconciliation pass failed: {}", e),
            }
        });
    }
}
