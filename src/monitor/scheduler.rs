// src/monitor/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{CycleOutcome, FeedMonitor};

/// Control surface for a running monitor loop.
#[derive(Clone)]
pub struct MonitorHandle {
    trigger: Arc<Notify>,
    stop: Arc<watch::Sender<bool>>,
}

impl MonitorHandle {
    /// Ask for a cycle now. While a cycle is running, any number of triggers
    /// collapse into a single follow-up cycle, which also stands in for a
    /// periodic tick that fell due during the same cycle.
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// Stop the loop at its next idle point. A running cycle finishes first.
    pub fn shutdown(&self) {
        self.stop.send_replace(true);
    }
}

/// Spawn the periodic loop. The first cycle runs immediately.
pub fn spawn_monitor(monitor: Arc<FeedMonitor>, period: Duration) -> (MonitorHandle, JoinHandle<()>) {
    let trigger = Arc::new(Notify::new());
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let handle = MonitorHandle {
        trigger: trigger.clone(),
        stop: Arc::new(stop_tx),
    };

    let join = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Dropping every handle closes the stop channel; the loop then runs until aborted.
        let mut stop_open = true;
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = trigger.notified() => {
                    tracing::info!(target: "monitor", "manual trigger");
                }
                res = stop_rx.changed(), if stop_open => {
                    if res.is_err() {
                        stop_open = false;
                        continue;
                    }
                }
            }
            if *stop_rx.borrow() {
                break;
            }

            if let CycleOutcome::FetchFailed { scope, error } = monitor.run_cycle().await {
                tracing::debug!(target: "monitor", %scope, kind = %error.kind, "retrying on next tick");
            }
            // Period restarts at IDLE. A tick missed during a long cycle is
            // dropped; a pending trigger still runs exactly once.
            ticker.reset();
        }
        tracing::info!(target: "monitor", "monitor loop stopped");
    });

    (handle, join)
}
