//! Integration tests for missed-task reconciliation and the host
//! power-signal boundary.

mod common;

use std::sync::Arc;
use std::time::Duration;

use beacon_scheduler::power::{ChannelPowerSource, PowerEvent, spawn_power_watcher};
use beacon_scheduler::{
    ExecutionMonitor, ExecutionStatus, MissedTaskReport, QueueConfig, ScheduledItem, SkipStale,
    TaskQueue,
};
use chrono::{DateTime, Utc};

use common::{ManualTimer, MockLoader, Recorder, settle, wait_until};

fn offset_ms(ms: i64) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::milliseconds(ms)
}

fn grace_1s() -> QueueConfig {
    QueueConfig::new(Duration::from_secs(1))
}

fn build_queue(
    config: QueueConfig,
    timer: &Arc<ManualTimer>,
    recorder: &Recorder,
    monitor: &ExecutionMonitor,
) -> TaskQueue {
    recorder
        .attach(TaskQueue::builder(config))
        .with_timer(Arc::clone(timer) as Arc<dyn beacon_scheduler::TimerFacility>)
        .with_monitor(monitor.clone())
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_missed_task_caught_up() {
    let timer = ManualTimer::new();
    let recorder = Recorder::new();
    let monitor = ExecutionMonitor::default();
    let queue = build_queue(grace_1s(), &timer, &recorder, &monitor);
    queue.start().await.unwrap();

    // Five seconds overdue, well past the one-second grace window.
    queue
        .add_task(ScheduledItem::new("t1", "reminders", offset_ms(-5000)))
        .await;

    let report = queue.check_missed_tasks().await;
    assert_eq!(
        report,
        MissedTaskReport {
            executed: 1,
            failed: 0,
            skipped: 0
        }
    );
    assert_eq!(recorder.invocations(), vec!["t1".to_string()]);
    assert_eq!(monitor.stats().successful_executions, 1);
    assert!(!queue.has_task("t1").await);
}

#[tokio::test]
async fn test_overdue_within_grace_left_for_timer() {
    let timer = ManualTimer::new();
    let recorder = Recorder::new();
    let monitor = ExecutionMonitor::default();
    let queue = build_queue(grace_1s(), &timer, &recorder, &monitor);
    queue.start().await.unwrap();

    // Overdue, but inside the grace window: the normal fire path owns it.
    queue
        .add_task(ScheduledItem::new("t1", "reminders", offset_ms(-500)))
        .await;

    let report = queue.check_missed_tasks().await;
    assert_eq!(report, MissedTaskReport::default());
    assert!(recorder.invocations().is_empty());
    assert!(queue.has_task("t1").await);
}

#[tokio::test]
async fn test_paused_task_excluded_from_reconciliation() {
    let timer = ManualTimer::new();
    let recorder = Recorder::new();
    let monitor = ExecutionMonitor::default();
    let queue = build_queue(grace_1s(), &timer, &recorder, &monitor);
    queue.start().await.unwrap();

    queue
        .add_task(ScheduledItem::new("t1", "reminders", offset_ms(-3_600_000)))
        .await;
    assert!(queue.pause_task("t1").await);

    let report = queue.check_missed_tasks().await;
    assert_eq!(report, MissedTaskReport::default());
    assert!(recorder.invocations().is_empty());
    assert!(queue.has_task("t1").await);
}

#[tokio::test]
async fn test_failed_catch_up_counted_not_propagated() {
    let timer = ManualTimer::new();
    let recorder = Recorder::new();
    recorder.fail_task("bad");
    let monitor = ExecutionMonitor::default();
    let queue = build_queue(grace_1s(), &timer, &recorder, &monitor);
    queue.start().await.unwrap();

    queue
        .add_task(ScheduledItem::new("bad", "reminders", offset_ms(-5000)))
        .await;
    queue
        .add_task(ScheduledItem::new("ok", "reminders", offset_ms(-4000)))
        .await;

    let report = queue.check_missed_tasks().await;
    assert_eq!(
        report,
        MissedTaskReport {
            executed: 1,
            failed: 1,
            skipped: 0
        }
    );
    assert_eq!(monitor.stats().failed_executions, 1);
    assert_eq!(monitor.stats().successful_executions, 1);
}

#[tokio::test]
async fn test_stale_policy_skips_and_advances_recurring() {
    let timer = ManualTimer::new();
    let recorder = Recorder::new();
    let monitor = ExecutionMonitor::default();
    let loader = MockLoader::new(Vec::new());
    let next_at = offset_ms(3_600_000);
    loader.push_occurrence("daily", next_at);

    let config = grace_1s().with_missed_task_policy(SkipStale {
        max_lateness: Duration::from_secs(2),
    });
    let queue = recorder
        .attach(TaskQueue::builder(config))
        .with_timer(Arc::clone(&timer) as Arc<dyn beacon_scheduler::TimerFacility>)
        .with_monitor(monitor.clone())
        .with_loader(Arc::clone(&loader) as Arc<dyn beacon_scheduler::TaskLoader>)
        .build()
        .unwrap();
    queue.start().await.unwrap();

    // Ten seconds late: past the policy's catch-up horizon.
    queue
        .add_task(ScheduledItem::new("daily", "task-instances", offset_ms(-10_000)))
        .await;

    let report = queue.check_missed_tasks().await;
    assert_eq!(
        report,
        MissedTaskReport {
            executed: 0,
            failed: 0,
            skipped: 1
        }
    );
    assert!(recorder.invocations().is_empty());

    let records = monitor.recent_records(10);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, ExecutionStatus::Skipped);
    assert!(records[0].reason.is_some());

    // Skipping one occurrence does not halt the series.
    assert!(queue.has_task("daily").await);
    assert_eq!(queue.status().await.next_wake_at, Some(next_at));
}

#[tokio::test]
async fn test_reload_before_reconcile_picks_up_loader_items() {
    let timer = ManualTimer::new();
    let recorder = Recorder::new();
    let monitor = ExecutionMonitor::default();
    // The missed item exists only on the loader side.
    let loader = MockLoader::new(vec![ScheduledItem::new(
        "persisted",
        "reminders",
        offset_ms(-5000),
    )]);

    let queue = recorder
        .attach(TaskQueue::builder(grace_1s().with_reload_before_reconcile()))
        .with_timer(Arc::clone(&timer) as Arc<dyn beacon_scheduler::TimerFacility>)
        .with_monitor(monitor.clone())
        .with_loader(Arc::clone(&loader) as Arc<dyn beacon_scheduler::TaskLoader>)
        .build()
        .unwrap();
    queue.start().await.unwrap();
    assert!(queue.remove_task("persisted").await);

    let report = queue.check_missed_tasks().await;
    assert_eq!(report.executed, 1);
    assert_eq!(recorder.invocations(), vec!["persisted".to_string()]);
}

#[tokio::test]
async fn test_resume_signal_triggers_reconciliation() {
    let timer = ManualTimer::new();
    let recorder = Recorder::new();
    let monitor = ExecutionMonitor::default();
    let queue = build_queue(grace_1s(), &timer, &recorder, &monitor);
    queue.start().await.unwrap();

    queue
        .add_task(ScheduledItem::new("t1", "reminders", offset_ms(-5000)))
        .await;

    let source = ChannelPowerSource::new();
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let watcher = spawn_power_watcher(queue.clone(), &source, shutdown_rx);

    source.emit(PowerEvent::Suspend);
    source.emit(PowerEvent::Resume);

    wait_until(|| recorder.invocations() == vec!["t1".to_string()]).await;
    settle().await;
    assert_eq!(monitor.stats().successful_executions, 1);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), watcher)
        .await
        .expect("watcher exits on shutdown")
        .unwrap();
}

#[tokio::test]
async fn test_builder_wired_power_source() {
    let timer = ManualTimer::new();
    let recorder = Recorder::new();
    let monitor = ExecutionMonitor::default();
    let source = Arc::new(ChannelPowerSource::new());

    let queue = recorder
        .attach(TaskQueue::builder(grace_1s()))
        .with_timer(Arc::clone(&timer) as Arc<dyn beacon_scheduler::TimerFacility>)
        .with_monitor(monitor.clone())
        .with_power_source(
            Arc::clone(&source) as Arc<dyn beacon_scheduler::PowerSignalSource>
        )
        .build()
        .unwrap();
    queue.start().await.unwrap();

    queue
        .add_task(ScheduledItem::new("t1", "reminders", offset_ms(-5000)))
        .await;
    source.emit(PowerEvent::Resume);

    wait_until(|| recorder.invocations() == vec!["t1".to_string()]).await;

    // Stopping tears the subscription down: later resumes are ignored.
    queue.stop();
    settle().await;
    queue
        .add_task(ScheduledItem::new("t2", "reminders", offset_ms(-5000)))
        .await;
    source.emit(PowerEvent::Resume);
    settle().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(recorder.invocations(), vec!["t1".to_string()]);
}
