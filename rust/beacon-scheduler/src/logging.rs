//! Structured logging helpers for task execution.

use std::time::{Duration, Instant};

/// Measures one execution callback and logs its outcome.
///
/// The timer logs a debug event when the attempt starts and an info/error
/// event when it finishes, carrying the task id, the owning module, and the
/// trigger ("timer" or "reconcile") as structured fields.
#[derive(Debug)]
pub struct ExecTimer {
    task_id: String,
    source_module: String,
    trigger: &'static str,
    start: Instant,
}

impl ExecTimer {
    /// Start timing one execution attempt and log the start.
    #[must_use]
    pub fn new(
        task_id: impl Into<String>,
        source_module: impl Into<String>,
        trigger: &'static str,
    ) -> Self {
        let task_id = task_id.into();
        let source_module = source_module.into();

        tracing::debug!(
            task_id = %task_id,
            source_module = %source_module,
            trigger,
            "Task execution started"
        );

        Self {
            task_id,
            source_module,
            trigger,
            start: Instant::now(),
        }
    }

    /// Finish with success, logging and returning the measured duration.
    pub fn finish_ok(self) -> Duration {
        let elapsed = self.start.elapsed();
        let duration_ms = elapsed.as_millis();

        tracing::info!(
            task_id = %self.task_id,
            source_module = %self.source_module,
            trigger = self.trigger,
            duration_ms,
            "Task execution completed"
        );

        elapsed
    }

    /// Finish with failure, logging the error and returning the duration.
    pub fn finish_err(self, error: &anyhow::Error) -> Duration {
        let elapsed = self.start.elapsed();
        let duration_ms = elapsed.as_millis();

        tracing::error!(
            task_id = %self.task_id,
            source_module = %self.source_module,
            trigger = self.trigger,
            duration_ms,
            error = %error,
            "Task execution failed"
        );

        elapsed
    }
}
