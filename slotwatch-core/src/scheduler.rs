use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::checker::{AvailabilityChecker, RunReport};
use crate::config::ScheduleSection;

/// Fires a check on a fixed interval. At most one run is in flight; a tick
/// that lands while a run is still going is skipped.
pub struct Scheduler {
    checker: Arc<AvailabilityChecker>,
    interval: Duration,
    run_on_start: bool,
    in_flight: Arc<Mutex<()>>,
}

impl Scheduler {
    pub fn new(checker: Arc<AvailabilityChecker>, schedule: &ScheduleSection) -> Self {
        Self::with_interval(checker, schedule.interval(), schedule.run_on_start)
    }

    pub fn with_interval(
        checker: Arc<AvailabilityChecker>,
        interval: Duration,
        run_on_start: bool,
    ) -> Self {
        Self {
            checker,
            interval,
            run_on_start,
            in_flight: Arc::new(Mutex::new(())),
        }
    }

    /// Spawns a run unless one is already in progress.
    pub fn try_start_run(&self) -> Option<JoinHandle<RunReport>> {
        match Arc::clone(&self.in_flight).try_lock_owned() {
            Ok(guard) => {
                let checker = Arc::clone(&self.checker);
                Some(tokio::spawn(async move {
                    let report = checker.run().await;
                    drop(guard);
                    report
                }))
            }
            Err(_) => {
                warn!("previous check still running; skipping this tick");
                self.checker.metrics().record(|m| m.record_run_skipped());
                None
            }
        }
    }

    /// Ticks until `shutdown` resolves, then waits for the in-flight run.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let first = if self.run_on_start {
            Instant::now()
        } else {
            Instant::now() + self.interval
        };
        let mut ticker = interval_at(first, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            interval_secs = self.interval.as_secs(),
            run_on_start = self.run_on_start,
            "scheduler started"
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested; no further runs will start");
                    break;
                }
                _ = ticker.tick() => {
                    self.try_start_run();
                }
            }
        }

        let _idle = self.in_flight.lock().await;
        let metrics = self.checker.metrics().snapshot();
        info!(
            runs_started = metrics.runs_started,
            runs_skipped = metrics.runs_skipped,
            runs_failed = metrics.runs_failed,
            notifications_sent = metrics.notifications_sent,
            "scheduler stopped"
        );
    }
}
