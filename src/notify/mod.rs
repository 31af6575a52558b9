// src/notify/mod.rs
//! New-item events and the sinks that deliver them to the presentation layer.

pub mod recent;
pub mod webhook;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::ListingRecord;

pub use recent::{BroadcastSink, RecentItems};
pub use webhook::WebhookSink;

/// One "new item" notification: the record plus the scope it was seen under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItemEvent {
    pub scope: String,
    #[serde(flatten)]
    pub record: ListingRecord,
}

#[async_trait]
pub trait NewItemSink: Send + Sync {
    fn name(&self) -> &'static str;
    async fn notify(&self, event: &NewItemEvent) -> Result<()>;
}

/// Fans each event out to every sink, in registration order.
/// A failing sink is logged and skipped; it never holds up the others.
#[derive(Clone, Default)]
pub struct NotifierMux {
    sinks: Vec<Arc<dyn NewItemSink>>,
}

impl NotifierMux {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn NewItemSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn push(&mut self, sink: Arc<dyn NewItemSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub async fn notify(&self, event: &NewItemEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.notify(event).await {
                tracing::warn!(
                    target: "notify",
                    sink = sink.name(),
                    item_id = %event.record.item_id,
                    "delivery failed: {e:#}"
                );
            }
        }
    }
}
