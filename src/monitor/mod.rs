// src/monitor/mod.rs
//! Feed Monitor: fetch → extract → diff against the seen-set → notify → persist.
//!
//! One cycle holds the seen-set lock from start to finish, so cycles never
//! interleave even if two are started at once. Notifications go out before the
//! seen-set is saved: a crash in between re-notifies, it never loses an item.

pub mod scheduler;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use metrics::{counter, gauge};
use serde::Serialize;
use tokio::sync::{watch, Mutex};

use crate::config::FeedEndpoint;
use crate::extract::{ExtractContext, ExtractionStrategy};
use crate::notify::{NewItemEvent, NotifierMux};
use crate::seen::{PersistenceError, SeenSet, SeenSetStore};
use crate::shaper::{FetchError, Fetcher};

pub use scheduler::{spawn_monitor, MonitorHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MonitorState {
    Idle,
    Fetching,
    Diffing,
    Notifying,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Records extracted across all scopes.
    pub fetched: usize,
    /// Ids announced this cycle, in feed order.
    pub new_ids: Vec<String>,
    pub known: usize,
    pub skipped: usize,
    pub persisted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// Nothing was diffed, announced or saved.
    FetchFailed { scope: String, error: FetchError },
}

/// Split of one batch. `new` keeps feed order; an id repeated inside the batch
/// is new at most once and every later copy lands in `known`.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Partition {
    pub new: Vec<NewItemEvent>,
    pub known: Vec<NewItemEvent>,
}

pub fn partition(batch: Vec<NewItemEvent>, seen: &SeenSet) -> Partition {
    let mut out = Partition::default();
    let mut announced: HashSet<String> = HashSet::new();
    for ev in batch {
        let id = &ev.record.item_id;
        if !seen.contains(id) && announced.insert(id.clone()) {
            out.new.push(ev);
        } else {
            out.known.push(ev);
        }
    }
    out
}

pub struct FeedMonitor {
    fetcher: Arc<dyn Fetcher>,
    strategy: Arc<dyn ExtractionStrategy>,
    feed: FeedEndpoint,
    scopes: Vec<String>,
    store: Arc<dyn SeenSetStore>,
    seen: Mutex<SeenSet>,
    notifier: NotifierMux,
    state: watch::Sender<MonitorState>,
}

impl FeedMonitor {
    /// Build the monitor and load the persisted seen-set.
    pub async fn load(
        fetcher: Arc<dyn Fetcher>,
        strategy: Arc<dyn ExtractionStrategy>,
        feed: FeedEndpoint,
        scopes: Vec<String>,
        store: Arc<dyn SeenSetStore>,
        notifier: NotifierMux,
    ) -> Result<Self, PersistenceError> {
        let seen = store.load().await?;
        tracing::info!(target: "monitor", seen = seen.len(), scopes = ?scopes, "seen-set loaded");
        let (state, _) = watch::channel(MonitorState::Idle);
        Ok(Self {
            fetcher,
            strategy,
            feed,
            scopes,
            store,
            seen: Mutex::new(seen),
            notifier,
            state,
        })
    }

    pub fn state(&self) -> MonitorState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<MonitorState> {
        self.state.subscribe()
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub async fn seen_snapshot(&self) -> SeenSet {
        self.seen.lock().await.clone()
    }

    fn enter(&self, s: MonitorState) {
        self.state.send_replace(s);
    }

    /// Run one full cycle. Failures are logged and reported, never raised.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let mut seen = self.seen.lock().await;
        counter!("monitor_cycles_total").increment(1);

        // FETCHING: scopes one after another, all-or-nothing.
        self.enter(MonitorState::Fetching);
        let observed_at = Utc::now();
        let mut docs = Vec::with_capacity(self.scopes.len());
        for scope in &self.scopes {
            let url = self.feed.url_for(scope);
            match self.fetcher.fetch(&url).await {
                Ok(body) => docs.push((scope.clone(), url, body)),
                Err(error) => {
                    counter!("monitor_cycle_failures_total").increment(1);
                    tracing::warn!(target: "monitor", %scope, kind = %error.kind, "feed fetch failed, cycle aborted: {error}");
                    self.enter(MonitorState::Idle);
                    return CycleOutcome::FetchFailed {
                        scope: scope.clone(),
                        error,
                    };
                }
            }
        }

        let mut batch = Vec::new();
        let mut skipped = 0usize;
        for (scope, url, body) in docs {
            let extracted = self
                .strategy
                .extract_many(&body, &ExtractContext::new(url, observed_at));
            skipped += extracted.skipped;
            batch.extend(extracted.records.into_iter().map(|record| NewItemEvent {
                scope: scope.clone(),
                record,
            }));
        }
        let fetched = batch.len();

        // DIFFING
        self.enter(MonitorState::Diffing);
        let Partition { new, known } = partition(batch, &seen);

        // NOTIFYING, then persist.
        self.enter(MonitorState::Notifying);
        for ev in &new {
            self.notifier.notify(ev).await;
        }
        counter!("monitor_new_items_total").increment(new.len() as u64);

        let new_ids: Vec<String> = new.into_iter().map(|ev| ev.record.item_id).collect();
        seen.extend(new_ids.iter().cloned());

        let persisted = match self.store.save(&seen).await {
            Ok(()) => true,
            Err(e) => {
                counter!("seen_persist_failures_total").increment(1);
                tracing::warn!(target: "monitor", "seen-set save failed, keeping in-memory state: {e}");
                false
            }
        };

        gauge!("monitor_last_cycle_ts").set(Utc::now().timestamp() as f64);
        tracing::info!(
            target: "monitor",
            fetched,
            new = new_ids.len(),
            known = known.len(),
            skipped,
            persisted,
            "cycle complete"
        );

        self.enter(MonitorState::Idle);
        CycleOutcome::Completed(CycleReport {
            fetched,
            new_ids,
            known: known.len(),
            skipped,
            persisted,
        })
    }
}
