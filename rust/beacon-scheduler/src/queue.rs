//! Task queue engine core.
//!
//! The queue is the single authority that decides when the process should
//! next wake. It owns the item store and the one outstanding timer arm:
//! every mutation re-arms the timer facility for the smallest `next_run_at`
//! among remaining Active items, or disarms it when none exist.
//!
//! Store mutation is serialized behind one async mutex, so the timer-fire
//! path and the reconciliation pass (triggered by an asynchronous resume
//! signal) can interleave without racing. Execution callbacks are awaited
//! one at a time in drain order; a hanging callback therefore stalls later
//! items of the same batch, which is an accepted limitation.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::QueueConfig;
use crate::error::SchedulerError;
use crate::item::{ItemStatus, ScheduledItem};
use crate::loader::TaskLoader;
use crate::logging::ExecTimer;
use crate::monitor::ExecutionMonitor;
use crate::power::{PowerSignalSource, spawn_power_watcher};
use crate::reconcile::{MissedTaskAction, MissedTaskReport};
use crate::store::ItemStore;
use crate::timer::{TimerFacility, TimerHandle};

/// Execution callback supplied by the host at construction.
///
/// Invoked once per due item; the engine never inspects the payload it
/// forwards. Errors are caught, recorded, and isolated per task.
pub type ExecuteFn =
    Arc<dyn Fn(String, ScheduledItem) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Optional error callback, invoked after a failed execution is recorded.
pub type ErrorFn = Arc<dyn Fn(&str, &anyhow::Error) + Send + Sync>;

/// Point-in-time snapshot of the queue, for transport adapters.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    /// Items in the store, Paused included.
    pub queue_size: usize,
    /// Wake time the timer is currently armed for.
    pub next_wake_at: Option<DateTime<Utc>>,
    /// Whether the queue has been started and not stopped.
    pub is_running: bool,
}

#[derive(Debug, Clone, Copy)]
struct ArmedWake {
    handle: TimerHandle,
    wake_at: DateTime<Utc>,
}

struct QueueInner {
    config: QueueConfig,
    store: Mutex<ItemStore>,
    timer: Arc<dyn TimerFacility>,
    execute: ExecuteFn,
    on_error: Option<ErrorFn>,
    monitor: ExecutionMonitor,
    loader: Option<Arc<dyn TaskLoader>>,
    power: Option<Arc<dyn PowerSignalSource>>,
    armed: parking_lot::Mutex<Option<ArmedWake>>,
    watcher: parking_lot::Mutex<Option<(watch::Sender<bool>, JoinHandle<()>)>>,
    running: AtomicBool,
}

/// The scheduled-task execution engine.
///
/// Cloning is cheap; all clones drive the same queue. Construct via
/// [`TaskQueue::builder`], which validates that the required collaborators
/// (timer facility, execution callback, monitor) were supplied.
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<QueueInner>,
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("config", &self.inner.config)
            .field("is_running", &self.inner.running.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl TaskQueue {
    /// Start building a queue with the given configuration.
    #[must_use]
    pub fn builder(config: QueueConfig) -> TaskQueueBuilder {
        TaskQueueBuilder {
            config,
            timer: None,
            execute: None,
            on_error: None,
            monitor: None,
            loader: None,
            power: None,
        }
    }

    /// Start the queue: populate the store from the task loader (when one
    /// is configured) and arm the timer for the earliest due time.
    ///
    /// Idempotent: starting an already-running queue is a logged no-op.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            debug!("task queue already started");
            return Ok(());
        }

        let mut store = self.inner.store.lock().await;
        if let Some(loader) = &self.inner.loader {
            match loader.load_all().await {
                Ok(items) => {
                    info!(count = items.len(), "loaded scheduled items");
                    for item in items {
                        store.upsert(item);
                    }
                }
                Err(error) => {
                    self.inner.running.store(false, Ordering::SeqCst);
                    return Err(SchedulerError::Loader(error));
                }
            }
        }
        self.rearm(&store);

        // Power-signal subscription is a detected capability: with no source
        // configured, reconciliation is only ever triggered manually.
        if let Some(source) = &self.inner.power {
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let handle = spawn_power_watcher(self.clone(), source.as_ref(), shutdown_rx);
            *self.inner.watcher.lock() = Some((shutdown_tx, handle));
        }

        info!(queue_size = store.len(), "task queue started");
        Ok(())
    }

    /// Stop waking up. The store is left intact, so state survives a
    /// stop/start cycle within the process. An in-flight execution callback
    /// is not cancelled; its outcome is still recorded.
    pub fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            debug!("task queue already stopped");
            return;
        }
        self.disarm_current();
        if let Some((shutdown_tx, _handle)) = self.inner.watcher.lock().take() {
            let _ = shutdown_tx.send(true);
        }
        info!("task queue stopped");
    }

    /// Add or overwrite a task, re-arming the timer if it is now earliest.
    pub async fn add_task(&self, item: ScheduledItem) {
        debug!(
            task_id = %item.task_id,
            source_module = %item.source_module,
            next_run_at = %item.next_run_at,
            "task added"
        );
        let mut store = self.inner.store.lock().await;
        store.upsert(item);
        self.rearm(&store);
    }

    /// Remove a task. Returns `false` when the id is unknown.
    pub async fn remove_task(&self, task_id: &str) -> bool {
        let mut store = self.inner.store.lock().await;
        let removed = store.remove(task_id);
        if removed {
            debug!(task_id, "task removed");
            self.rearm(&store);
        }
        removed
    }

    /// Move a task to a new due time. Returns `false` when the id is
    /// unknown. A paused task keeps its paused status.
    pub async fn update_task_schedule(
        &self,
        task_id: &str,
        next_run_at: DateTime<Utc>,
    ) -> bool {
        let mut store = self.inner.store.lock().await;
        let Some(mut item) = store.get(task_id).cloned() else {
            return false;
        };
        item.next_run_at = next_run_at;
        store.upsert(item);
        debug!(task_id, next_run_at = %next_run_at, "task rescheduled");
        self.rearm(&store);
        true
    }

    /// Exclude a task from due-time computation without deleting it.
    /// Returns `false` when the id is unknown.
    pub async fn pause_task(&self, task_id: &str) -> bool {
        let mut store = self.inner.store.lock().await;
        let Some(mut item) = store.get(task_id).cloned() else {
            return false;
        };
        item.status = ItemStatus::Paused;
        store.upsert(item);
        debug!(task_id, "task paused");
        self.rearm(&store);
        true
    }

    /// Re-insert a task as Active. The caller supplies a fresh item because
    /// only the caller knows the correct next run time to resume with.
    pub async fn resume_task(&self, mut item: ScheduledItem) {
        item.status = ItemStatus::Active;
        debug!(task_id = %item.task_id, next_run_at = %item.next_run_at, "task resumed");
        let mut store = self.inner.store.lock().await;
        store.upsert(item);
        self.rearm(&store);
    }

    /// Whether a task with this id is in the store.
    pub async fn has_task(&self, task_id: &str) -> bool {
        self.inner.store.lock().await.get(task_id).is_some()
    }

    /// All queued tasks, Paused included, sorted by task id.
    pub async fn queued_tasks(&self) -> Vec<ScheduledItem> {
        self.inner.store.lock().await.list_all()
    }

    /// Disarm the timer and empty the store.
    pub async fn clear(&self) {
        let mut store = self.inner.store.lock().await;
        store.clear();
        self.disarm_current();
        info!("task queue cleared");
    }

    /// Snapshot of the queue's current state.
    pub async fn status(&self) -> QueueStatus {
        let queue_size = self.inner.store.lock().await.len();
        QueueStatus {
            queue_size,
            next_wake_at: self.inner.armed.lock().as_ref().map(|a| a.wake_at),
            is_running: self.inner.running.load(Ordering::SeqCst),
        }
    }

    /// Handle to the injected execution monitor.
    #[must_use]
    pub fn monitor(&self) -> ExecutionMonitor {
        self.inner.monitor.clone()
    }

    /// Find Active items whose due time passed by more than the grace
    /// window and drive catch-up execution or explicit skip per the
    /// configured policy. Invoked by the host on resume-from-suspend, or
    /// manually. Per-item failures are counted, never propagated.
    pub async fn check_missed_tasks(&self) -> MissedTaskReport {
        let mut report = MissedTaskReport::default();

        if self.inner.config.reload_before_reconcile {
            self.refresh_from_loader().await;
        }

        let now = Utc::now();
        let Some(cutoff) = chrono::Duration::from_std(self.inner.config.grace_window)
            .ok()
            .and_then(|grace| now.checked_sub_signed(grace))
        else {
            return report;
        };

        let missed = { self.inner.store.lock().await.drain_overdue_active(cutoff) };
        if missed.is_empty() {
            debug!("no missed tasks found");
            return report;
        }
        info!(count = missed.len(), "reconciling missed tasks");

        for item in missed {
            let overdue_by = (now - item.next_run_at).to_std().unwrap_or_default();
            match self
                .inner
                .config
                .missed_task_policy
                .decide(&item, overdue_by)
            {
                MissedTaskAction::Execute => {
                    if self.run_item(&item, "reconcile").await {
                        report.executed += 1;
                    } else {
                        report.failed += 1;
                    }
                }
                MissedTaskAction::Skip { reason } => {
                    debug!(task_id = %item.task_id, reason = %reason, "missed task skipped");
                    self.inner.monitor.record_execution_skipped(
                        &item.task_id,
                        &item.display_name(),
                        &reason,
                    );
                    self.schedule_next(&item).await;
                    report.skipped += 1;
                }
            }
        }

        {
            let store = self.inner.store.lock().await;
            self.rearm(&store);
        }

        info!(
            executed = report.executed,
            failed = report.failed,
            skipped = report.skipped,
            "missed-task reconciliation complete"
        );
        report
    }

    /// Timer-fire entry point: drain everything currently due, execute in
    /// drain order, then re-arm for the new minimum.
    async fn fire(&self) {
        let now = Utc::now();
        let due = { self.inner.store.lock().await.drain_due_active(now) };
        if !due.is_empty() {
            debug!(count = due.len(), "draining due tasks");
            for item in &due {
                self.run_item(item, "timer").await;
            }
        }
        let store = self.inner.store.lock().await;
        self.rearm(&store);
    }

    /// Execute one drained item and report its outcome. Returns `true` on
    /// success. Never propagates the callback's error.
    async fn run_item(&self, item: &ScheduledItem, trigger: &'static str) -> bool {
        let name = item.display_name();
        self.inner
            .monitor
            .record_execution_start(&item.task_id, &name);
        let timer = ExecTimer::new(&item.task_id, &item.source_module, trigger);

        let result = (self.inner.execute)(item.task_id.clone(), item.clone()).await;
        match result {
            Ok(()) => {
                let elapsed = timer.finish_ok();
                self.inner
                    .monitor
                    .record_execution_success(&item.task_id, &name, Some(elapsed));
                self.schedule_next(item).await;
                true
            }
            Err(error) => {
                timer.finish_err(&error);
                self.inner
                    .monitor
                    .record_execution_failure(&item.task_id, &name, &error);
                if let Some(on_error) = &self.inner.on_error {
                    on_error(&item.task_id, &error);
                }
                if self.inner.config.advance_recurring_on_failure {
                    // A single failed firing does not halt a recurring series.
                    self.schedule_next(item).await;
                } else {
                    let mut store = self.inner.store.lock().await;
                    store.upsert(item.clone());
                }
                false
            }
        }
    }

    /// Ask the loader for a recurring item's next occurrence and re-insert
    /// it. One-shots (no loader, or no next occurrence) are left removed.
    async fn schedule_next(&self, item: &ScheduledItem) {
        let Some(loader) = &self.inner.loader else {
            return;
        };
        if let Some(next_run_at) = loader.next_occurrence(item) {
            debug!(
                task_id = %item.task_id,
                next_run_at = %next_run_at,
                "recurring task rescheduled"
            );
            let mut follow_up = item.clone();
            follow_up.next_run_at = next_run_at;
            follow_up.status = ItemStatus::Active;
            let mut store = self.inner.store.lock().await;
            store.upsert(follow_up);
        }
    }

    async fn refresh_from_loader(&self) {
        let Some(loader) = &self.inner.loader else {
            return;
        };
        match loader.load_all().await {
            Ok(items) => {
                let mut store = self.inner.store.lock().await;
                for item in items {
                    store.upsert(item);
                }
            }
            Err(error) => {
                warn!(error = %error, "loader refresh failed before reconciliation");
            }
        }
    }

    /// Keep the timer armed for exactly the smallest `next_run_at` among
    /// Active items. Re-arming always disarms the previous handle first, so
    /// at most one arm is outstanding.
    fn rearm(&self, store: &ItemStore) {
        if !self.inner.running.load(Ordering::SeqCst) {
            self.disarm_current();
            return;
        }

        let earliest = store.peek_earliest_active().map(|item| item.next_run_at);
        let mut armed = self.inner.armed.lock();
        match earliest {
            None => {
                if let Some(prev) = armed.take() {
                    self.inner.timer.disarm(prev.handle);
                    debug!("timer disarmed, no active items");
                }
            }
            Some(wake_at) => {
                if armed.as_ref().is_some_and(|a| a.wake_at == wake_at) {
                    return;
                }
                if let Some(prev) = armed.take() {
                    self.inner.timer.disarm(prev.handle);
                }
                let delay = (wake_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                let queue = self.clone();
                let handle = self.inner.timer.arm(
                    delay,
                    Box::new(move || {
                        tokio::spawn(async move { queue.handle_wake(wake_at).await });
                    }),
                );
                *armed = Some(ArmedWake { handle, wake_at });
                debug!(wake_at = %wake_at, delay_ms = delay.as_millis(), "timer armed");
            }
        }
    }

    fn disarm_current(&self) {
        if let Some(prev) = self.inner.armed.lock().take() {
            self.inner.timer.disarm(prev.handle);
        }
    }

    async fn handle_wake(&self, wake_at: DateTime<Utc>) {
        {
            let mut armed = self.inner.armed.lock();
            if armed.as_ref().is_some_and(|a| a.wake_at == wake_at) {
                *armed = None;
            }
        }
        self.fire().await;
    }
}

/// Builder for [`TaskQueue`]. Missing required collaborators surface as
/// [`SchedulerError::MissingCollaborator`] from [`TaskQueueBuilder::build`].
pub struct TaskQueueBuilder {
    config: QueueConfig,
    timer: Option<Arc<dyn TimerFacility>>,
    execute: Option<ExecuteFn>,
    on_error: Option<ErrorFn>,
    monitor: Option<ExecutionMonitor>,
    loader: Option<Arc<dyn TaskLoader>>,
    power: Option<Arc<dyn PowerSignalSource>>,
}

impl fmt::Debug for TaskQueueBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueueBuilder")
            .field("config", &self.config)
            .field("has_timer", &self.timer.is_some())
            .field("has_execute", &self.execute.is_some())
            .field("has_monitor", &self.monitor.is_some())
            .finish_non_exhaustive()
    }
}

impl TaskQueueBuilder {
    /// Supply the timer facility the queue arms its wakes on.
    #[must_use]
    pub fn with_timer(mut self, timer: Arc<dyn TimerFacility>) -> Self {
        self.timer = Some(timer);
        self
    }

    /// Supply the execution callback invoked for each due item.
    #[must_use]
    pub fn with_execute<F, Fut>(mut self, execute: F) -> Self
    where
        F: Fn(String, ScheduledItem) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.execute = Some(Arc::new(move |task_id, item| {
            execute(task_id, item).boxed()
        }));
        self
    }

    /// Supply an error callback invoked after each failed execution.
    #[must_use]
    pub fn with_error_handler<F>(mut self, on_error: F) -> Self
    where
        F: Fn(&str, &anyhow::Error) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(on_error));
        self
    }

    /// Supply the execution monitor outcomes are reported to.
    #[must_use]
    pub fn with_monitor(mut self, monitor: ExecutionMonitor) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Supply the task loader used for startup population and recurrence.
    #[must_use]
    pub fn with_loader(mut self, loader: Arc<dyn TaskLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Supply a host power-signal source. The queue then reconciles missed
    /// tasks automatically after every resume-from-suspend while running.
    #[must_use]
    pub fn with_power_source(mut self, source: Arc<dyn PowerSignalSource>) -> Self {
        self.power = Some(source);
        self
    }

    /// Validate collaborators and build the queue.
    pub fn build(self) -> Result<TaskQueue, SchedulerError> {
        let timer = self
            .timer
            .ok_or(SchedulerError::MissingCollaborator("timer facility"))?;
        let execute = self
            .execute
            .ok_or(SchedulerError::MissingCollaborator("execution callback"))?;
        let monitor = self
            .monitor
            .ok_or(SchedulerError::MissingCollaborator("execution monitor"))?;

        Ok(TaskQueue {
            inner: Arc::new(QueueInner {
                config: self.config,
                store: Mutex::new(ItemStore::new()),
                timer,
                execute,
                on_error: self.on_error,
                monitor,
                loader: self.loader,
                power: self.power,
                armed: parking_lot::Mutex::new(None),
                watcher: parking_lot::Mutex::new(None),
                running: AtomicBool::new(false),
            }),
        })
    }
}
