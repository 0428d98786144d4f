//! Queue configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::reconcile::{CatchUp, MissedTaskPolicy};

/// Tunable behavior of the task queue.
///
/// The grace window has no default: how late is "missed" rather than merely
/// "due" is a product decision the host must make explicitly.
#[derive(Clone)]
pub struct QueueConfig {
    /// How far past its due time an item must be before the reconciliation
    /// pass treats it as missed. Items inside the window are left for the
    /// normal timer path.
    pub grace_window: Duration,
    /// Whether a failed firing of a recurring item still advances the
    /// series to its next occurrence. When `false` the same occurrence is
    /// retried on the next wake, which can loop on a persistent failure.
    pub advance_recurring_on_failure: bool,
    /// Whether `check_missed_tasks` refreshes the store from the task
    /// loader before computing missed items.
    pub reload_before_reconcile: bool,
    /// Per-item decision for missed items.
    pub missed_task_policy: Arc<dyn MissedTaskPolicy>,
}

impl QueueConfig {
    /// Configuration with the given grace window and default policies:
    /// catch up on every missed item, advance recurring series on failure.
    #[must_use]
    pub fn new(grace_window: Duration) -> Self {
        Self {
            grace_window,
            advance_recurring_on_failure: true,
            reload_before_reconcile: false,
            missed_task_policy: Arc::new(CatchUp),
        }
    }

    /// Replace the missed-task policy.
    #[must_use]
    pub fn with_missed_task_policy(mut self, policy: impl MissedTaskPolicy + 'static) -> Self {
        self.missed_task_policy = Arc::new(policy);
        self
    }

    /// Retry a recurring item's failed occurrence instead of advancing.
    #[must_use]
    pub fn with_retry_failed_occurrence(mut self) -> Self {
        self.advance_recurring_on_failure = false;
        self
    }

    /// Refresh items from the loader before each reconciliation pass.
    #[must_use]
    pub fn with_reload_before_reconcile(mut self) -> Self {
        self.reload_before_reconcile = true;
        self
    }
}

impl fmt::Debug for QueueConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueConfig")
            .field("grace_window", &self.grace_window)
            .field(
                "advance_recurring_on_failure",
                &self.advance_recurring_on_failure,
            )
            .field("reload_before_reconcile", &self.reload_before_reconcile)
            .finish_non_exhaustive()
    }
}
