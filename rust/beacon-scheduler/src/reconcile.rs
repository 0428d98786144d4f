//! Missed-task reconciliation policy.
//!
//! When the host resumes from suspend (or a wall-clock gap is detected),
//! the queue scans for Active items whose due time passed by more than the
//! configured grace window while the OS timers were dead. The policy decides
//! per item whether to catch up by executing it late or to skip it
//! explicitly; either way the outcome lands in the execution monitor.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::item::ScheduledItem;

/// Per-item decision of a [`MissedTaskPolicy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissedTaskAction {
    /// Execute the item now, late.
    Execute,
    /// Do not execute; record a skip with the given reason.
    Skip {
        /// Reason recorded with the skip.
        reason: String,
    },
}

/// Decides what to do with an item whose firing was missed.
pub trait MissedTaskPolicy: Send + Sync {
    /// Decide for one missed item. `overdue_by` is how far past its due
    /// time the item is at reconciliation time.
    fn decide(&self, item: &ScheduledItem, overdue_by: Duration) -> MissedTaskAction;
}

/// Default policy: always attempt execution.
///
/// Catching up is preferred to silent loss, since scheduled items represent
/// user-visible reminders.
#[derive(Debug, Clone, Copy, Default)]
pub struct CatchUp;

impl MissedTaskPolicy for CatchUp {
    fn decide(&self, _item: &ScheduledItem, _overdue_by: Duration) -> MissedTaskAction {
        MissedTaskAction::Execute
    }
}

/// Skip items that are too stale to be worth firing late.
///
/// A reminder whose moment has long passed is pointless to deliver; items
/// overdue by more than `max_lateness` are skipped, the rest caught up.
#[derive(Debug, Clone, Copy)]
pub struct SkipStale {
    /// Largest lateness still worth executing.
    pub max_lateness: Duration,
}

impl MissedTaskPolicy for SkipStale {
    fn decide(&self, _item: &ScheduledItem, overdue_by: Duration) -> MissedTaskAction {
        if overdue_by > self.max_lateness {
            MissedTaskAction::Skip {
                reason: format!("missed by {}s, past catch-up horizon", overdue_by.as_secs()),
            }
        } else {
            MissedTaskAction::Execute
        }
    }
}

/// Aggregate outcome of one reconciliation pass, for caller logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissedTaskReport {
    /// Missed items executed successfully.
    pub executed: usize,
    /// Missed items whose catch-up execution failed.
    pub failed: usize,
    /// Missed items skipped by policy.
    pub skipped: usize,
}
