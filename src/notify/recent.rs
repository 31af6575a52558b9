// src/notify/recent.rs
//! In-process sinks: a bounded history for the HTTP API and a broadcast channel
//! for live viewers.

use std::collections::VecDeque;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::{NewItemEvent, NewItemSink};

/// Most recent events, oldest dropped first.
#[derive(Debug)]
pub struct RecentItems {
    inner: Mutex<VecDeque<NewItemEvent>>,
    cap: usize,
}

impl RecentItems {
    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.clamp(1, 10_000);
        Self {
            inner: Mutex::new(VecDeque::with_capacity(cap)),
            cap,
        }
    }

    pub fn push(&self, ev: NewItemEvent) {
        let mut q = self.inner.lock();
        q.push_back(ev);
        while q.len() > self.cap {
            q.pop_front();
        }
    }

    /// Last `n` events, oldest first.
    pub fn snapshot_last_n(&self, n: usize) -> Vec<NewItemEvent> {
        let q = self.inner.lock();
        let start = q.len().saturating_sub(n);
        q.iter().skip(start).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl NewItemSink for RecentItems {
    fn name(&self) -> &'static str {
        "recent"
    }

    async fn notify(&self, event: &NewItemEvent) -> Result<()> {
        self.push(event.clone());
        Ok(())
    }
}

/// Broadcast fan-out. Having no subscribers is not an error.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<NewItemEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NewItemEvent> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl NewItemSink for BroadcastSink {
    fn name(&self) -> &'static str {
        "broadcast"
    }

    async fn notify(&self, event: &NewItemEvent) -> Result<()> {
        // Err only means nobody is listening right now.
        let _ = self.tx.send(event.clone());
        Ok(())
    }
}
