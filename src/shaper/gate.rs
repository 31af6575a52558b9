// src/shaper/gate.rs
//! Process-wide minimum spacing between outbound requests.
//!
//! Time comes from `tokio::time`, so tests drive it with a paused clock.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/// One token for the whole process. The upstream limit is per IP, not per endpoint,
/// so feed polling and live lookups queue on the same gate.
#[derive(Debug)]
pub struct MinIntervalGate {
    min_interval: Duration,
    last_dispatch: Mutex<Option<Instant>>,
}

impl MinIntervalGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_dispatch: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Block until `min_interval` has passed since the previous dispatch,
    /// then record this dispatch. Returns how long the caller waited.
    ///
    /// The lock is held across the sleep: waiters are served in arrival order
    /// and two callers can never dispatch inside the same interval.
    pub async fn wait_turn(&self) -> Duration {
        let mut last = self.last_dispatch.lock().await;
        let arrived = Instant::now();

        if let Some(prev) = *last {
            let ready_at = prev + self.min_interval;
            if ready_at > arrived {
                sleep_until(ready_at).await;
            }
        }

        let now = Instant::now();
        *last = Some(now);
        now.saturating_duration_since(arrived)
    }

    /// Time of the most recent dispatch, if any.
    pub async fn last_dispatch(&self) -> Option<Instant> {
        *self.last_dispatch.lock().await
    }
}
