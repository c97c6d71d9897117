//! Stall monitor for a single processing step.
//!
//! Arming spawns an alarm task that sleeps for the threshold, then warns and
//! keeps warning at a fixed interval. Dropping the monitor aborts the task, so
//! a step that ends (for any reason) never produces a late warning.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::Instrument;

use crate::lane::{LaneId, PoolId};

/// Thresholds for stall reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StallThresholds {
    /// A step running longer than this is reported.
    pub too_long_time: Duration,
    /// Once reported, repeat the warning this often until the step ends.
    pub warn_interval: Duration,
}

#[must_use = "the monitor is disarmed as soon as it is dropped"]
#[derive(Debug)]
pub struct StallMonitor {
    started: Instant,
    alarm_handle: JoinHandle<()>,
}

impl StallMonitor {
    /// Arm the monitor for a step that starts now.
    ///
    /// Every warning bumps `warnings`, which pools expose through their stats.
    /// Warnings are emitted inside the caller's current span.
    pub fn arm(
        pool: PoolId,
        lane: LaneId,
        thresholds: StallThresholds,
        warnings: Arc<AtomicU64>,
    ) -> Self {
        let started = Instant::now();
        let alarm = async move {
            tokio::time::sleep(thresholds.too_long_time).await;

            // interval_at keeps the first warning at the threshold itself.
            let mut ticker = tokio::time::interval_at(Instant::now(), thresholds.warn_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                warnings.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    %pool,
                    %lane,
                    elapsed = ?started.elapsed(),
                    threshold = ?thresholds.too_long_time,
                    "Processing step is taking too long"
                );
            }
        };
        let alarm_handle = tokio::spawn(alarm.in_current_span());

        Self {
            started,
            alarm_handle,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Disarm and return how long the step ran.
    pub fn disarm(self) -> Duration {
        self.elapsed()
    }
}

impl Drop for StallMonitor {
    fn drop(&mut self) {
        self.alarm_handle.abort();
    }
}
