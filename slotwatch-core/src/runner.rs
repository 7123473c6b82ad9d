use std::future::Future;
use std::sync::Arc;

use crate::checker::{AvailabilityChecker, CheckerMetrics, RunReport};
use crate::config::{RunMode, ScheduleSection};
use crate::notify::NotifyResult;
use crate::scheduler::Scheduler;

#[derive(Debug, Clone)]
pub enum Execution {
    /// A single check ran to completion.
    Report(RunReport),
    TestNotificationSent,
    /// The scheduler loop was shut down; carries the counters it accumulated.
    Stopped(CheckerMetrics),
}

/// Entry point for every run mode. The mode is fixed for the life of the
/// process; `shutdown` only matters for [`RunMode::Scheduled`].
pub async fn execute<F>(
    mode: RunMode,
    checker: Arc<AvailabilityChecker>,
    schedule: &ScheduleSection,
    shutdown: F,
) -> NotifyResult<Execution>
where
    F: Future<Output = ()>,
{
    match mode {
        RunMode::Once => Ok(Execution::Report(checker.run().await)),
        RunMode::TestNotification => {
            checker.send_test_notification().await?;
            Ok(Execution::TestNotificationSent)
        }
        RunMode::Scheduled => {
            let scheduler = Scheduler::new(Arc::clone(&checker), schedule);
            scheduler.run_until(shutdown).await;
            Ok(Execution::Stopped(checker.metrics().snapshot()))
        }
    }
}
