use std::sync::Arc;
use std::time::{Duration, Instant};

use drainwatch_protocol::{IterationSnapshot, MergedReport, ScoredSnapshot};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::calibration::Calibration;
use crate::monitor::Monitor;

/// Polls every monitor once per interval and scores what they report.
pub struct PowerEstimator {
    calibration: Arc<Calibration>,
    monitors: Vec<Box<dyn Monitor>>,
    interval: Duration,
}

impl PowerEstimator {
    pub fn new(
        calibration: Arc<Calibration>,
        monitors: Vec<Box<dyn Monitor>>,
        interval: Duration,
    ) -> Self {
        Self {
            calibration,
            monitors,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn monitor_count(&self) -> usize {
        self.monitors.len()
    }

    /// Samples every monitor in order. A failing monitor is replaced by its
    /// zero snapshot for this iteration and flagged as degraded.
    pub fn sample_iteration(&mut self, iteration: u64) -> MergedReport {
        let started = Instant::now();
        let mut report = MergedReport::new(iteration);

        for monitor in &mut self.monitors {
            let subsystem = monitor.subsystem();
            let (snapshot, degraded) = match monitor.sample_iteration(iteration) {
                Ok(snapshot) => (snapshot, false),
                Err(e) => {
                    error!(subsystem = %subsystem, iteration, error = %e, "Monitor failed");
                    (IterationSnapshot::zero(subsystem, iteration), true)
                }
            };
            debug_assert_eq!(snapshot.subsystem, subsystem);
            report.insert(score(&self.calibration, snapshot, degraded));
        }

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        report
    }

    /// Runs until `shutdown` is set, the report receiver goes away, or
    /// `limit` reports have been sent. Returns the number of iterations run.
    ///
    /// Shutdown is only observed between iterations. Must be called from a
    /// multi-threaded runtime.
    pub async fn run(
        &mut self,
        reports: mpsc::Sender<MergedReport>,
        mut shutdown: watch::Receiver<bool>,
        limit: Option<u64>,
    ) -> u64 {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_ms = self.interval.as_millis() as u64,
            monitors = self.monitors.len(),
            "Power estimator started"
        );

        let mut iteration = 0u64;
        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        debug!("Shutdown sender dropped");
                        break;
                    }
                    continue;
                }
            }

            let started = Instant::now();
            let report = tokio::task::block_in_place(|| self.sample_iteration(iteration));
            let elapsed = started.elapsed();
            if elapsed > self.interval {
                warn!(
                    iteration,
                    elapsed_ms = elapsed.as_millis() as u64,
                    interval_ms = self.interval.as_millis() as u64,
                    "Iteration overran the polling interval"
                );
            }

            if reports.send(report).await.is_err() {
                debug!("Report receiver closed");
                break;
            }

            iteration += 1;
            if limit.is_some_and(|limit| iteration >= limit) {
                break;
            }
        }

        info!(iterations = iteration, "Power estimator stopped");
        iteration
    }
}

fn score(calibration: &Calibration, snapshot: IterationSnapshot, degraded: bool) -> ScoredSnapshot {
    let system_watts = calibration.score(&snapshot.system);
    let owner_watts = snapshot
        .owners
        .iter()
        .map(|(uid, record)| (*uid, calibration.score(record)))
        .collect();

    ScoredSnapshot {
        snapshot,
        system_watts,
        owner_watts,
        degraded,
    }
}
