//! Scheduled item data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Participation state of a scheduled item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    /// Participates in due-time computation and firing.
    Active,
    /// Retained in the store but excluded from due-time computation.
    Paused,
}

/// One task known to the engine.
///
/// The engine treats `payload` and `recurrence_hint` as opaque: the payload
/// is forwarded to the execution callback unchanged, and the hint is handed
/// back to the task loader when a recurring item needs its next occurrence
/// computed. Recurrence rules themselves are never interpreted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledItem {
    /// Opaque unique identifier, assigned by the caller.
    pub task_id: String,
    /// Absolute time of the next firing. Retained but ignored while paused.
    pub next_run_at: DateTime<Utc>,
    /// Tag identifying the owning business capability (reminders, goals, ...).
    /// Used only for observability and filtering.
    pub source_module: String,
    /// Whether the item participates in due-time computation.
    pub status: ItemStatus,
    /// Opaque caller data forwarded to the execution callback.
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Opaque recurrence descriptor forwarded to the task loader.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence_hint: Option<serde_json::Value>,
}

impl ScheduledItem {
    /// Create an active item with an empty payload.
    #[must_use]
    pub fn new(
        task_id: impl Into<String>,
        source_module: impl Into<String>,
        next_run_at: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            next_run_at,
            source_module: source_module.into(),
            status: ItemStatus::Active,
            payload: serde_json::Value::Null,
            recurrence_hint: None,
        }
    }

    /// Attach an opaque execution payload.
    #[must_use]
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Attach an opaque recurrence hint.
    #[must_use]
    pub fn with_recurrence_hint(mut self, hint: serde_json::Value) -> Self {
        self.recurrence_hint = Some(hint);
        self
    }

    /// Whether the item participates in due-time computation.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == ItemStatus::Active
    }

    /// Display label used by the execution monitor.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{}/{}", self.source_module, self.task_id)
    }
}
