//! Task loader collaborator boundary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::item::ScheduledItem;

/// Supplies task definitions from the host's persistence layer.
///
/// The engine keeps no durable state of its own: `load_all` populates the
/// store on [`TaskQueue::start`](crate::queue::TaskQueue::start), and
/// `next_occurrence` is consulted after each execution of a recurring item.
/// Recurrence computation lives entirely on this side of the boundary; the
/// engine forwards the item (including its opaque `recurrence_hint`) and
/// schedules whatever comes back.
#[async_trait]
pub trait TaskLoader: Send + Sync {
    /// Load every persisted item that should be scheduled.
    async fn load_all(&self) -> anyhow::Result<Vec<ScheduledItem>>;

    /// Next occurrence for a just-executed item, or `None` for one-shots.
    fn next_occurrence(&self, item: &ScheduledItem) -> Option<DateTime<Utc>> {
        let _ = item;
        None
    }
}
