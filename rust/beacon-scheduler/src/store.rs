//! In-memory scheduled item store.
//!
//! Items are keyed by task id, with a sorted index over `(next_run_at,
//! task_id)` covering only Active items. The index gives O(log n)
//! insert/remove, O(1) peek-minimum, and deterministic drain order:
//! ascending due time, ties broken by ascending task id.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};

use crate::item::{ItemStatus, ScheduledItem};

/// Ordered collection of scheduled items, exclusively owned by the queue.
#[derive(Debug, Default)]
pub struct ItemStore {
    items: HashMap<String, ScheduledItem>,
    /// Sorted index over Active items only.
    by_due: BTreeSet<(DateTime<Utc>, String)>,
}

impl ItemStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite an item. A duplicate id is an update, not an
    /// error: the common case is rescheduling an existing item.
    pub fn upsert(&mut self, item: ScheduledItem) {
        if let Some(prev) = self.items.remove(&item.task_id) {
            self.by_due.remove(&(prev.next_run_at, prev.task_id));
        }
        if item.status == ItemStatus::Active {
            self.by_due.insert((item.next_run_at, item.task_id.clone()));
        }
        self.items.insert(item.task_id.clone(), item);
    }

    /// Remove an item. Returns `false` when the id is unknown.
    pub fn remove(&mut self, task_id: &str) -> bool {
        match self.items.remove(task_id) {
            Some(prev) => {
                self.by_due.remove(&(prev.next_run_at, prev.task_id));
                true
            }
            None => false,
        }
    }

    /// Look up an item by id.
    #[must_use]
    pub fn get(&self, task_id: &str) -> Option<&ScheduledItem> {
        self.items.get(task_id)
    }

    /// The Active item with the smallest `next_run_at`, if any.
    #[must_use]
    pub fn peek_earliest_active(&self) -> Option<&ScheduledItem> {
        self.by_due.first().and_then(|(_, id)| self.items.get(id))
    }

    /// Remove and return all Active items with `next_run_at <= as_of`,
    /// ordered by due time ascending, ties by task id ascending.
    pub fn drain_due_active(&mut self, as_of: DateTime<Utc>) -> Vec<ScheduledItem> {
        self.drain_index(|at| at <= as_of)
    }

    /// Remove and return all Active items with `next_run_at < before`,
    /// in the same order as [`Self::drain_due_active`]. Used by the
    /// missed-task reconciliation pass, which excludes the grace window.
    pub fn drain_overdue_active(&mut self, before: DateTime<Utc>) -> Vec<ScheduledItem> {
        self.drain_index(|at| at < before)
    }

    fn drain_index(&mut self, in_range: impl Fn(DateTime<Utc>) -> bool) -> Vec<ScheduledItem> {
        let due: Vec<(DateTime<Utc>, String)> = self
            .by_due
            .iter()
            .take_while(|(at, _)| in_range(*at))
            .cloned()
            .collect();
        let mut drained = Vec::with_capacity(due.len());
        for key in due {
            self.by_due.remove(&key);
            if let Some(item) = self.items.remove(&key.1) {
                drained.push(item);
            }
        }
        drained
    }

    /// All items (Active and Paused), sorted by task id for determinism.
    #[must_use]
    pub fn list_all(&self) -> Vec<ScheduledItem> {
        let mut items: Vec<ScheduledItem> = self.items.values().cloned().collect();
        items.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        items
    }

    /// Number of items in the store, Paused included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the store holds no items at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Remove every item.
    pub fn clear(&mut self) {
        self.items.clear();
        self.by_due.clear();
    }
}
