// src/cache.rs
//! Process-lifetime memo for live lookups.
//!
//! One slot per normalized query. The first caller runs the resolution; callers
//! that arrive while it is in flight await the same slot. Found and not-found
//! outcomes stay forever. Failures are handed to everyone who joined, then the
//! slot is dropped so a later call can retry.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::OnceCell;

use crate::model::ListingRecord;
use crate::shaper::FetchError;

/// Memoized outcome of one query. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedResolution {
    pub query_key: String,
    /// `None` is the explicit "not found" marker.
    pub record: Option<ListingRecord>,
    pub resolved_at: DateTime<Utc>,
}

impl CachedResolution {
    pub fn found(&self) -> bool {
        self.record.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    pub resolution: CachedResolution,
    /// False only for the caller that actually ran the resolution.
    pub from_cache: bool,
}

type Slot<E> = Arc<OnceCell<Result<CachedResolution, E>>>;

pub struct ResultCache<E = FetchError> {
    slots: Mutex<HashMap<String, Slot<E>>>,
}

impl<E> Default for ResultCache<E> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<E: Clone> ResultCache<E> {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, query_key: &str) -> Slot<E> {
        let mut slots = self.slots.lock();
        slots.entry(query_key.to_string()).or_default().clone()
    }

    pub async fn get_or_resolve<F, Fut>(&self, query_key: &str, resolve: F) -> Result<Lookup, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<ListingRecord>, E>>,
    {
        let slot = self.slot(query_key);

        let mut ran = false;
        let ran_flag = &mut ran;
        let key = query_key.to_string();
        let outcome = slot
            .get_or_init(|| async move {
                *ran_flag = true;
                resolve().await.map(|record| CachedResolution {
                    query_key: key,
                    record,
                    resolved_at: Utc::now(),
                })
            })
            .await
            .clone();

        if ran && outcome.is_err() {
            let mut slots = self.slots.lock();
            if slots.get(query_key).is_some_and(|cur| Arc::ptr_eq(cur, &slot)) {
                slots.remove(query_key);
            }
        }

        outcome.map(|resolution| Lookup {
            resolution,
            from_cache: !ran,
        })
    }

    /// Completed entry for `query_key`, if any. Never waits on in-flight work.
    pub fn peek(&self, query_key: &str) -> Option<CachedResolution> {
        let slots = self.slots.lock();
        slots
            .get(query_key)
            .and_then(|s| s.get())
            .and_then(|r| r.as_ref().ok())
            .cloned()
    }

    /// Number of completed, successful entries.
    pub fn len(&self) -> usize {
        let slots = self.slots.lock();
        slots
            .values()
            .filter(|s| matches!(s.get(), Some(Ok(_))))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Memo key: lowercased, whitespace runs collapsed (full-width spaces included).
pub fn normalize_query(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
