//! Host power-signal boundary.
//!
//! A desktop-resident process can be suspended for an arbitrary period,
//! during which any number of scheduled firings are missed entirely by the
//! OS timer facilities. The engine does not talk to the OS itself: hosts
//! implement [`PowerSignalSource`] over their platform notification API and
//! hand it to [`spawn_power_watcher`], which runs the missed-task
//! reconciliation on every resume. Hosts with no native signal can fall
//! back to [`spawn_clock_gap_watchdog`], which infers a suspend from a gap
//! in wall-clock continuity.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::queue::TaskQueue;

/// OS power notification relevant to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerEvent {
    /// The host is about to suspend.
    Suspend,
    /// The host resumed from suspend.
    Resume,
}

/// Source of suspend/resume notifications.
///
/// Implementations are platform-specific and live outside this crate; a
/// missing source simply means reconciliation is never triggered
/// automatically (callers may still invoke
/// [`TaskQueue::check_missed_tasks`] manually).
pub trait PowerSignalSource: Send + Sync {
    /// Subscribe to the event stream.
    fn subscribe(&self) -> broadcast::Receiver<PowerEvent>;
}

/// In-process power-signal source fed by the host.
///
/// Useful for hosts that receive suspend/resume notifications on a foreign
/// callback thread (a desktop shell's IPC layer, for instance) and need to
/// forward them into the engine.
#[derive(Debug, Clone)]
pub struct ChannelPowerSource {
    tx: broadcast::Sender<PowerEvent>,
}

impl ChannelPowerSource {
    /// Create a source with a small buffered fan-out channel.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    /// Publish one event to all subscribers.
    pub fn emit(&self, event: PowerEvent) {
        // Send only fails when no watcher is subscribed, which is fine.
        let _ = self.tx.send(event);
    }
}

impl Default for ChannelPowerSource {
    fn default() -> Self {
        Self::new()
    }
}

impl PowerSignalSource for ChannelPowerSource {
    fn subscribe(&self) -> broadcast::Receiver<PowerEvent> {
        self.tx.subscribe()
    }
}

/// Spawn a task that reconciles missed work after every resume signal.
///
/// The watcher runs until `shutdown` flips to `true` or the source closes.
pub fn spawn_power_watcher(
    queue: TaskQueue,
    source: &dyn PowerSignalSource,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let mut events = source.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("power watcher shutting down");
                        break;
                    }
                }
                event = events.recv() => match event {
                    Ok(PowerEvent::Resume) => {
                        info!("resume signal received, checking for missed tasks");
                        queue.check_missed_tasks().await;
                    }
                    Ok(PowerEvent::Suspend) => {
                        debug!("suspend signal received");
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "power event stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("power signal source closed");
                        break;
                    }
                },
            }
        }
    })
}

/// Spawn a fallback watchdog that detects suspend-sized wall-clock gaps.
///
/// Samples the wall clock every `sample_interval`; when the observed
/// elapsed time exceeds the interval by more than `gap_threshold`, the
/// process was evidently not running (or the clock jumped) and a
/// reconciliation pass is triggered.
pub fn spawn_clock_gap_watchdog(
    queue: TaskQueue,
    sample_interval: Duration,
    gap_threshold: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sample_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick completes immediately.
        ticker.tick().await;
        let mut last_sample = Utc::now();
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = Utc::now();
                    let observed = (now - last_sample).to_std().unwrap_or_default();
                    last_sample = now;
                    if observed > sample_interval + gap_threshold {
                        warn!(
                            observed_secs = observed.as_secs(),
                            expected_secs = sample_interval.as_secs(),
                            "wall-clock gap detected, checking for missed tasks"
                        );
                        queue.check_missed_tasks().await;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("clock-gap watchdog shutting down");
                        break;
                    }
                }
            }
        }
    })
}
