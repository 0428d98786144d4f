//! Execution monitor: bounded history plus aggregate statistics.
//!
//! The monitor is a pure observability sink. It never fails, never blocks
//! the queue beyond a short critical section, and never influences
//! scheduling decisions. Both the normal fire path and the missed-task
//! reconciliation pass report through it, so observability is uniform
//! regardless of what triggered an execution.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default capacity of the record ring buffer.
pub const DEFAULT_MAX_RECORDS: usize = 100;

/// Outcome state of one execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Execution has begun and no terminal outcome is recorded yet.
    Started,
    /// The execution callback completed without error.
    Success,
    /// The execution callback returned an error.
    Failure,
    /// The execution was deliberately not attempted.
    Skipped,
}

/// The monitor's memory of one execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Unique record id.
    pub id: Uuid,
    /// Task this attempt belongs to.
    pub task_id: String,
    /// Display label.
    pub task_name: String,
    /// When the attempt started.
    pub started_at: DateTime<Utc>,
    /// When the attempt reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall-clock execution duration. Terminal states only.
    pub duration: Option<Duration>,
    /// Current state of the attempt.
    pub status: ExecutionStatus,
    /// Error message for failures.
    pub error: Option<String>,
    /// Reason for skips.
    pub reason: Option<String>,
}

impl ExecutionRecord {
    fn started(task_id: &str, task_name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id: task_id.to_string(),
            task_name: task_name.to_string(),
            started_at: Utc::now(),
            completed_at: None,
            duration: None,
            status: ExecutionStatus::Started,
            error: None,
            reason: None,
        }
    }
}

/// Aggregate counters over all recorded executions.
///
/// Counters are never decremented; [`ExecutionMonitor::reset_stats`] is the
/// only way back to zero. `total_executions` counts terminal outcomes
/// (success, failure, and skip); `last_execution_at` tracks the most recent
/// success or failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStats {
    /// Terminal outcomes recorded in total.
    pub total_executions: u64,
    /// Executions that completed without error.
    pub successful_executions: u64,
    /// Executions whose callback returned an error.
    pub failed_executions: u64,
    /// Executions deliberately not attempted.
    pub skipped_executions: u64,
    /// Time of the most recent success or failure.
    pub last_execution_at: Option<DateTime<Utc>>,
    /// Running mean duration over successful executions with a known duration.
    pub average_execution_duration: Option<Duration>,
}

#[derive(Debug, Default)]
struct MonitorState {
    records: VecDeque<ExecutionRecord>,
    stats: ExecutionStats,
    /// Successful executions that contributed to the mean.
    duration_samples: u64,
    duration_total_nanos: u128,
}

#[derive(Debug)]
struct MonitorInner {
    max_records: usize,
    state: RwLock<MonitorState>,
}

/// Shared handle to the execution monitor.
///
/// Cloning is cheap; all clones observe the same state.
#[derive(Debug, Clone)]
pub struct ExecutionMonitor {
    inner: Arc<MonitorInner>,
}

impl Default for ExecutionMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RECORDS)
    }
}

impl ExecutionMonitor {
    /// Create a monitor retaining at most `max_records` recent records.
    ///
    /// # Panics
    ///
    /// Panics if `max_records` is zero.
    #[must_use]
    pub fn new(max_records: usize) -> Self {
        assert!(max_records > 0, "monitor ring buffer needs capacity");
        Self {
            inner: Arc::new(MonitorInner {
                max_records,
                state: RwLock::new(MonitorState::default()),
            }),
        }
    }

    /// Record that an execution attempt has begun.
    pub fn record_execution_start(&self, task_id: &str, task_name: &str) {
        let mut state = self.inner.state.write();
        let record = ExecutionRecord::started(task_id, task_name);
        Self::push_record(&mut state, self.inner.max_records, record);
    }

    /// Record a successful execution.
    ///
    /// Finalizes the pending `Started` record for `task_id` in place,
    /// computing the duration from its start time when the caller does not
    /// supply one. With no pending record (a reconciliation-driven execution,
    /// for instance) a synthetic terminal record is created directly.
    pub fn record_execution_success(
        &self,
        task_id: &str,
        task_name: &str,
        duration: Option<Duration>,
    ) {
        let now = Utc::now();
        let mut state = self.inner.state.write();

        let resolved = match Self::pending_index(&state, task_id) {
            Some(idx) => {
                let record = &mut state.records[idx];
                let elapsed = duration
                    .or_else(|| (now - record.started_at).to_std().ok())
                    .unwrap_or_default();
                record.status = ExecutionStatus::Success;
                record.completed_at = Some(now);
                record.duration = Some(elapsed);
                Some(elapsed)
            }
            None => {
                let mut record = ExecutionRecord::started(task_id, task_name);
                record.status = ExecutionStatus::Success;
                record.completed_at = Some(now);
                record.duration = duration;
                Self::push_record(&mut state, self.inner.max_records, record);
                duration
            }
        };

        state.stats.total_executions += 1;
        state.stats.successful_executions += 1;
        state.stats.last_execution_at = Some(now);
        if let Some(elapsed) = resolved {
            state.duration_samples += 1;
            state.duration_total_nanos += elapsed.as_nanos();
            let mean = state.duration_total_nanos / u128::from(state.duration_samples);
            state.stats.average_execution_duration =
                Some(Duration::from_nanos(u64::try_from(mean).unwrap_or(u64::MAX)));
        }
    }

    /// Record a failed execution. Same pending-record rules as success.
    pub fn record_execution_failure(&self, task_id: &str, task_name: &str, error: &anyhow::Error) {
        let now = Utc::now();
        let mut state = self.inner.state.write();

        match Self::pending_index(&state, task_id) {
            Some(idx) => {
                let record = &mut state.records[idx];
                let elapsed = (now - record.started_at).to_std().ok();
                record.status = ExecutionStatus::Failure;
                record.completed_at = Some(now);
                record.duration = elapsed;
                record.error = Some(error.to_string());
            }
            None => {
                let mut record = ExecutionRecord::started(task_id, task_name);
                record.status = ExecutionStatus::Failure;
                record.completed_at = Some(now);
                record.error = Some(error.to_string());
                Self::push_record(&mut state, self.inner.max_records, record);
            }
        }

        state.stats.total_executions += 1;
        state.stats.failed_executions += 1;
        state.stats.last_execution_at = Some(now);
    }

    /// Record that an execution was deliberately skipped.
    pub fn record_execution_skipped(&self, task_id: &str, task_name: &str, reason: &str) {
        let now = Utc::now();
        let mut state = self.inner.state.write();

        let mut record = ExecutionRecord::started(task_id, task_name);
        record.status = ExecutionStatus::Skipped;
        record.completed_at = Some(now);
        record.reason = Some(reason.to_string());
        Self::push_record(&mut state, self.inner.max_records, record);

        state.stats.total_executions += 1;
        state.stats.skipped_executions += 1;
    }

    /// Defensive copy of the aggregate statistics.
    #[must_use]
    pub fn stats(&self) -> ExecutionStats {
        self.inner.state.read().stats.clone()
    }

    /// The most recent records, oldest first (most recent last), at most
    /// `limit` of them.
    #[must_use]
    pub fn recent_records(&self, limit: usize) -> Vec<ExecutionRecord> {
        let state = self.inner.state.read();
        let skip = state.records.len().saturating_sub(limit);
        state.records.iter().skip(skip).cloned().collect()
    }

    /// Clear all counters and the record ring buffer.
    pub fn reset_stats(&self) {
        let mut state = self.inner.state.write();
        *state = MonitorState::default();
    }

    /// Most recent pending `Started` record for a task, if any.
    fn pending_index(state: &MonitorState, task_id: &str) -> Option<usize> {
        state
            .records
            .iter()
            .rposition(|r| r.task_id == task_id && r.status == ExecutionStatus::Started)
    }

    /// Append to the ring, evicting the single oldest record past capacity.
    fn push_record(state: &mut MonitorState, max_records: usize, record: ExecutionRecord) {
        if state.records.len() == max_records {
            state.records.pop_front();
        }
        state.records.push_back(record);
    }
}
