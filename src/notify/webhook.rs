// src/notify/webhook.rs
use super::{NewItemEvent, NewItemSink};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use crate::model::StockStatus;

/// POSTs each new item as JSON to a webhook (Discord-compatible body).
#[derive(Clone)]
pub struct WebhookSink {
    url: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl WebhookSink {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    async fn post_with_retries(&self, payload: &WebhookPayload<'_>) -> Result<()> {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.url)
                .timeout(self.timeout)
                .json(payload)
                .send()
                .await;

            let err = match res {
                Ok(rsp) => match rsp.error_for_status_ref() {
                    Ok(_) => return Ok(()),
                    Err(e) => anyhow!("webhook HTTP error: {e}"),
                },
                Err(e) => anyhow!("webhook request failed: {e}"),
            };
            if attempt >= self.max_retries {
                return Err(err);
            }
            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
        }
    }
}

#[async_trait]
impl NewItemSink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn notify(&self, event: &NewItemEvent) -> Result<()> {
        self.post_with_retries(&WebhookPayload::from_event(event)).await
    }
}

#[derive(Serialize)]
struct WebhookEmbed {
    title: String,
    url: String,
    description: String,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    content: Option<String>,
    embeds: Vec<WebhookEmbed>,
    item: &'a NewItemEvent,
}

impl<'a> WebhookPayload<'a> {
    fn from_event(ev: &'a NewItemEvent) -> Self {
        let r = &ev.record;
        let stock = match r.in_stock {
            StockStatus::InStock => "in stock",
            StockStatus::OutOfStock => "out of stock",
            StockStatus::Unknown => "stock unknown",
        };
        let store = if r.store.is_empty() { "-" } else { r.store.as_str() };
        Self {
            content: None,
            embeds: vec![WebhookEmbed {
                title: r.title.clone(),
                url: r.link.clone(),
                description: format!(
                    "**Price:** {} {}\n**Stock:** {}\n**Store:** {}\n**Scope:** {}",
                    r.price_minor_units,
                    r.currency.code(),
                    stock,
                    store,
                    ev.scope
                ),
            }],
            item: ev,
        }
    }
}
