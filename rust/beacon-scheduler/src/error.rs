//! Engine error types.
//!
//! Only construction-time misuse and host-integration failures surface as
//! errors. Per-task execution failures are reported through the
//! [`ExecutionMonitor`](crate::monitor::ExecutionMonitor) and the optional
//! error callback, never to the queue's caller.

use thiserror::Error;

/// Errors raised by the scheduler engine itself.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A required collaborator was not supplied to the builder.
    #[error("missing required collaborator: {0}")]
    MissingCollaborator(&'static str),

    /// The task loader failed while populating the queue.
    #[error("task loader failed")]
    Loader(#[source] anyhow::Error),

    /// A process-wide default queue has already been installed.
    #[error("a default task queue is already installed for this process")]
    DefaultQueueInstalled,
}
