//! Timer facility abstraction.
//!
//! The queue arms at most one single-shot timer at a time and re-arms it
//! whenever the earliest due time changes. Hiding the host's delayed-callback
//! primitive behind a trait keeps the wake logic substitutable in tests and
//! portable across host runtimes.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

/// Callback invoked when an armed timer elapses.
pub type WakeCallback = Box<dyn FnOnce() + Send + 'static>;

/// Opaque handle to one outstanding arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

impl TimerHandle {
    /// Wrap a facility-assigned id. Handles are only meaningful to the
    /// facility that issued them.
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Single-shot delayed-callback primitive.
///
/// Implementations must support a zero delay (fire on the next tick) and
/// must tolerate disarming a handle that has already fired.
pub trait TimerFacility: Send + Sync {
    /// Schedule `callback` to run once after `delay`.
    fn arm(&self, delay: Duration, callback: WakeCallback) -> TimerHandle;

    /// Cancel an outstanding arm. A no-op if the timer already fired.
    fn disarm(&self, handle: TimerHandle);
}

/// Production timer backed by a spawned `tokio::time::sleep` task.
#[derive(Debug, Default)]
pub struct TokioTimer {
    next_id: AtomicU64,
    pending: Arc<Mutex<HashMap<u64, tokio::task::JoinHandle<()>>>>,
}

impl TokioTimer {
    /// Create a timer facility. Must be used from within a tokio runtime.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TimerFacility for TokioTimer {
    fn arm(&self, delay: Duration, callback: WakeCallback) -> TimerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let pending = Arc::clone(&self.pending);
        // Hold the registry lock across the spawn so the task cannot observe
        // the map before its own handle is registered.
        let mut registry = self.pending.lock();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            pending.lock().remove(&id);
            callback();
        });
        registry.insert(id, task);
        TimerHandle(id)
    }

    fn disarm(&self, handle: TimerHandle) {
        if let Some(task) = self.pending.lock().remove(&handle.0) {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use super::*;

    fn flag_callback(flag: &Arc<AtomicBool>) -> WakeCallback {
        let flag = Arc::clone(flag);
        Box::new(move || flag.store(true, Ordering::SeqCst))
    }

    #[tokio::test(start_paused = true)]
    async fn test_armed_timer_fires_after_delay() {
        let timer = TokioTimer::new();
        let fired = Arc::new(AtomicBool::new(false));
        timer.arm(Duration::from_millis(100), flag_callback(&fired));

        tokio::time::sleep(Duration::from_millis(50)).await;
        tokio::task::yield_now().await;
        assert!(!fired.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_millis(60)).await;
        tokio::task::yield_now().await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_delay_fires_on_next_tick() {
        let timer = TokioTimer::new();
        let fired = Arc::new(AtomicBool::new(false));
        timer.arm(Duration::ZERO, flag_callback(&fired));

        tokio::time::sleep(Duration::from_millis(1)).await;
        tokio::task::yield_now().await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_cancels_pending_fire() {
        let timer = TokioTimer::new();
        let fired = Arc::new(AtomicBool::new(false));
        let handle = timer.arm(Duration::from_millis(50), flag_callback(&fired));
        timer.disarm(handle);

        tokio::time::sleep(Duration::from_millis(100)).await;
        tokio::task::yield_now().await;
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_after_fire_is_a_noop() {
        let timer = TokioTimer::new();
        let fired = Arc::new(AtomicBool::new(false));
        let handle = timer.arm(Duration::from_millis(10), flag_callback(&fired));

        tokio::time::sleep(Duration::from_millis(20)).await;
        tokio::task::yield_now().await;
        assert!(fired.load(Ordering::SeqCst));

        // The callback ran exactly once; disarming the spent handle is safe.
        timer.disarm(handle);
    }
}
