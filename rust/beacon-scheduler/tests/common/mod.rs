//! Shared mock collaborators for the integration tests.

#![allow(dead_code, reason = "not every test binary uses every helper")]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use beacon_scheduler::queue::TaskQueueBuilder;
use beacon_scheduler::timer::{TimerFacility, TimerHandle, WakeCallback};
use beacon_scheduler::{ScheduledItem, TaskLoader};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Deterministic timer double: records arms, fires only on demand.
#[derive(Default)]
pub struct ManualTimer {
    state: Mutex<ManualTimerState>,
}

#[derive(Default)]
struct ManualTimerState {
    next_id: u64,
    armed: Vec<(TimerHandle, Duration, Option<WakeCallback>)>,
}

impl ManualTimer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Outstanding arms. The queue contract keeps this at most one.
    pub fn armed_count(&self) -> usize {
        self.state.lock().armed.len()
    }

    /// Invoke the callback of the earliest-delay arm, if any.
    pub fn fire_next(&self) -> bool {
        let callback = {
            let mut state = self.state.lock();
            let earliest = state
                .armed
                .iter()
                .enumerate()
                .min_by_key(|(_, (_, delay, _))| *delay)
                .map(|(idx, _)| idx);
            match earliest {
                Some(idx) => state.armed.remove(idx).2,
                None => return false,
            }
        };
        match callback {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }
}

impl TimerFacility for ManualTimer {
    fn arm(&self, delay: Duration, callback: WakeCallback) -> TimerHandle {
        let mut state = self.state.lock();
        state.next_id += 1;
        let handle = TimerHandle::new(state.next_id);
        state.armed.push((handle, delay, Some(callback)));
        handle
    }

    fn disarm(&self, handle: TimerHandle) {
        self.state.lock().armed.retain(|(h, _, _)| *h != handle);
    }
}

/// Loader double with canned items and per-task occurrence sequences.
#[derive(Default)]
pub struct MockLoader {
    items: Mutex<Vec<ScheduledItem>>,
    occurrences: Mutex<HashMap<String, VecDeque<DateTime<Utc>>>>,
    load_calls: AtomicUsize,
}

impl MockLoader {
    pub fn new(items: Vec<ScheduledItem>) -> Arc<Self> {
        Arc::new(Self {
            items: Mutex::new(items),
            ..Self::default()
        })
    }

    /// Queue up the next occurrence handed out for a task.
    pub fn push_occurrence(&self, task_id: &str, at: DateTime<Utc>) {
        self.occurrences
            .lock()
            .entry(task_id.to_string())
            .or_default()
            .push_back(at);
    }

    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskLoader for MockLoader {
    async fn load_all(&self) -> anyhow::Result<Vec<ScheduledItem>> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.items.lock().clone())
    }

    fn next_occurrence(&self, item: &ScheduledItem) -> Option<DateTime<Utc>> {
        self.occurrences
            .lock()
            .get_mut(&item.task_id)
            .and_then(VecDeque::pop_front)
    }
}

/// Execution callback double: records invocation order, fails on request.
#[derive(Clone, Default)]
pub struct Recorder {
    invocations: Arc<Mutex<Vec<String>>>,
    failing: Arc<Mutex<HashSet<String>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the callback fail for this task id.
    pub fn fail_task(&self, task_id: &str) {
        self.failing.lock().insert(task_id.to_string());
    }

    /// Task ids in invocation order, failed attempts included.
    pub fn invocations(&self) -> Vec<String> {
        self.invocations.lock().clone()
    }

    /// Wire this recorder in as the builder's execution callback.
    pub fn attach(&self, builder: TaskQueueBuilder) -> TaskQueueBuilder {
        let recorder = self.clone();
        builder.with_execute(move |task_id, _item| {
            let recorder = recorder.clone();
            async move {
                recorder.invocations.lock().push(task_id.clone());
                if recorder.failing.lock().contains(&task_id) {
                    anyhow::bail!("simulated execution failure: {task_id}");
                }
                Ok(())
            }
        })
    }
}

/// Poll until `cond` holds, panicking after a couple of seconds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met within 2s");
}

/// Give spawned wake handlers a chance to run.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
