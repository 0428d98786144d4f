//! Beacon Scheduler - Scheduled-task execution engine
//!
//! This crate is the scheduling core of the Beacon productivity suite. It
//! holds a working set of time-triggered tasks (reminders, recurring task
//! instances, goal check-ins), wakes exactly when the next one is due,
//! invokes a caller-supplied execution callback, and recovers from the host
//! machine being suspended for an arbitrary period:
//!
//! - **Single-timer wake protocol**: one outstanding timer arm, always set
//!   to the earliest due time among active items
//! - **Live mutation**: add, remove, reschedule, pause, and resume tasks on
//!   a running queue
//! - **Missed-task reconciliation**: catch up or skip firings lost to a
//!   laptop sleep, driven by suspend/resume signals or a wall-clock gap
//! - **Execution monitor**: bounded history and aggregate statistics over
//!   every execution attempt, uniform across trigger sources
//!
//! # Architecture
//!
//! The engine is organized into several key modules:
//!
//! - [`queue`]: the engine core that owns the store and drives execution
//! - [`store`]: ordered in-memory collection of scheduled items
//! - [`monitor`]: execution records and statistics
//! - [`reconcile`]: missed-task policies and reconciliation reporting
//! - [`timer`]: the single-shot timer facility boundary
//! - [`loader`]: the persistence-side collaborator boundary
//! - [`power`]: suspend/resume signal boundary and watchers
//! - [`config`]: queue configuration
//!
//! The engine is a library component: transport adapters, persistence, and
//! per-task business logic are the host's concern. Tasks are executed
//! sequentially in due order on the host's async runtime; the engine never
//! inspects task payloads.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use beacon_scheduler::{
//!     ExecutionMonitor, QueueConfig, ScheduledItem, TaskQueue, TokioTimer,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let queue = TaskQueue::builder(QueueConfig::new(Duration::from_secs(30)))
//!         .with_timer(Arc::new(TokioTimer::new()))
//!         .with_monitor(ExecutionMonitor::default())
//!         .with_execute(|task_id, item| async move {
//!             deliver_reminder(&task_id, &item.payload).await
//!         })
//!         .build()?;
//!
//!     queue.start().await?;
//!     queue
//!         .add_task(ScheduledItem::new(
//!             "reminder-42",
//!             "reminders",
//!             chrono::Utc::now() + chrono::Duration::minutes(5),
//!         ))
//!         .await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod item;
pub mod loader;
pub mod logging;
pub mod monitor;
pub mod power;
pub mod queue;
pub mod reconcile;
pub mod store;
pub mod timer;

use std::sync::OnceLock;

pub use config::QueueConfig;
pub use error::SchedulerError;
pub use item::{ItemStatus, ScheduledItem};
pub use loader::TaskLoader;
pub use monitor::{ExecutionMonitor, ExecutionRecord, ExecutionStats, ExecutionStatus};
pub use power::{ChannelPowerSource, PowerEvent, PowerSignalSource};
pub use queue::{QueueStatus, TaskQueue};
pub use reconcile::{CatchUp, MissedTaskAction, MissedTaskPolicy, MissedTaskReport, SkipStale};
pub use store::ItemStore;
pub use timer::{TimerFacility, TimerHandle, TokioTimer, WakeCallback};

static DEFAULT_QUEUE: OnceLock<TaskQueue> = OnceLock::new();

/// Install a process-wide default queue.
///
/// A convenience for hosts that want one shared engine without threading a
/// handle through every consumer. The queue type itself carries no
/// singleton state; this is the only process-global and it can be set
/// exactly once.
pub fn install_default_queue(queue: TaskQueue) -> Result<(), SchedulerError> {
    DEFAULT_QUEUE
        .set(queue)
        .map_err(|_| SchedulerError::DefaultQueueInstalled)
}

/// The installed process-wide default queue, if any.
#[must_use]
pub fn default_queue() -> Option<&'static TaskQueue> {
    DEFAULT_QUEUE.get()
}
