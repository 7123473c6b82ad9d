mod support;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::sleep;

use slotwatch_core::{execute, Execution, RunMode, Scheduler};

use support::{mixed_menu, CountingFactory, FakePortal, Harness, RecordingNotifier};

#[tokio::test(start_paused = true)]
async fn overlapping_tick_is_skipped() {
    let gate = Arc::new(Notify::new());
    let portal = FakePortal::new(mixed_menu());
    let factory = Arc::new(CountingFactory::gated(portal.clone(), Arc::clone(&gate)));
    let harness = Harness::with_parts(portal, factory, RecordingNotifier::default());
    let checker = Arc::new(harness.checker());
    let scheduler = Scheduler::with_interval(Arc::clone(&checker), Duration::from_secs(60), true);

    let first = scheduler.try_start_run().expect("first run starts");
    assert!(scheduler.try_start_run().is_none());

    gate.notify_one();
    let report = first.await.unwrap();
    assert!(!report.outcome.is_failure());

    let metrics = checker.metrics().snapshot();
    assert_eq!(metrics.runs_started, 1);
    assert_eq!(metrics.runs_skipped, 1);
    assert_eq!(harness.factory.opens(), 1);

    gate.notify_one();
    let again = scheduler.try_start_run().expect("guard released after the run");
    again.await.unwrap();
    assert_eq!(checker.metrics().snapshot().runs_started, 2);
}

#[tokio::test(start_paused = true)]
async fn ticks_on_interval_until_shutdown() {
    let harness = Harness::new(FakePortal::new(mixed_menu()));
    let checker = Arc::new(harness.checker());
    let scheduler = Scheduler::with_interval(Arc::clone(&checker), Duration::from_secs(60), true);

    scheduler
        .run_until(sleep(Duration::from_secs(150)))
        .await;

    let metrics = checker.metrics().snapshot();
    assert_eq!(metrics.runs_started, 3);
    assert_eq!(metrics.runs_skipped, 0);
    assert_eq!(harness.portal.closes(), 3);
    assert_eq!(harness.notifier.messages().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn first_run_waits_for_interval_when_not_run_on_start() {
    let harness = Harness::new(FakePortal::new(mixed_menu()));
    let checker = Arc::new(harness.checker());
    let scheduler = Scheduler::with_interval(Arc::clone(&checker), Duration::from_secs(60), false);

    scheduler.run_until(sleep(Duration::from_secs(30))).await;

    assert_eq!(checker.metrics().snapshot().runs_started, 0);
    assert_eq!(harness.factory.opens(), 0);
}

#[tokio::test(start_paused = true)]
async fn scheduled_mode_returns_counters_on_shutdown() {
    let harness = Harness::new(FakePortal::new(mixed_menu()));
    let checker = Arc::new(harness.checker());
    let execution = execute(
        RunMode::Scheduled,
        checker,
        &harness.config.schedule,
        sleep(Duration::from_secs(60)),
    )
    .await
    .unwrap();

    match execution {
        Execution::Stopped(metrics) => {
            assert_eq!(metrics.runs_started, 1);
            assert_eq!(metrics.availability_found, 1);
        }
        other => panic!("unexpected execution {other:?}"),
    }
}
