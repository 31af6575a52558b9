// src/resolver.rs
//! Live Resolver: free-text query → price/stock/profit for the overlay.
//!
//! Flow: normalize → cache → (miss) search fetch with the raw query →
//! first well-formed result → conversion → profit → tier.

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use serde::Serialize;

use crate::cache::{normalize_query, Lookup, ResultCache};
use crate::config::SearchEndpoint;
use crate::extract::{ExtractContext, ExtractionStrategy};
use crate::model::{short_hash, ListingRecord, StockStatus};
use crate::profit::{compute_profit, ConversionRate, Profit};
use crate::shaper::{FetchError, Fetcher};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedListing {
    pub record: ListingRecord,
    pub converted_price: f64,
    /// Absent when the caller supplied no reference price.
    pub profit: Option<Profit>,
}

/// `NotFound` is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionResult {
    Found(Box<ResolvedListing>),
    NotFound,
}

/// Flat shape consumed by the overlay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolutionResponse {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Source currency, minor units.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub converted_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_stock: Option<StockStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit_percent: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<crate::profit::Tier>,
}

impl ResolutionResult {
    pub fn found(&self) -> bool {
        matches!(self, ResolutionResult::Found(_))
    }

    pub fn to_response(&self) -> ResolutionResponse {
        match self {
            ResolutionResult::NotFound => ResolutionResponse {
                found: false,
                title: None,
                price: None,
                currency: None,
                converted_price: None,
                in_stock: None,
                store: None,
                link: None,
                profit: None,
                profit_percent: None,
                tier: None,
            },
            ResolutionResult::Found(r) => ResolutionResponse {
                found: true,
                title: Some(r.record.title.clone()),
                price: Some(r.record.price_minor_units),
                currency: Some(r.record.currency.code()),
                converted_price: Some(r.converted_price),
                in_stock: Some(r.record.in_stock),
                store: Some(r.record.store.clone()),
                link: Some(r.record.link.clone()),
                profit: r.profit.map(|p| p.profit),
                profit_percent: r.profit.and_then(|p| p.profit_percent),
                tier: r.profit.map(|p| p.tier),
            },
        }
    }
}

struct Inner {
    fetcher: Arc<dyn Fetcher>,
    strategy: Arc<dyn ExtractionStrategy>,
    search: SearchEndpoint,
    rate: ConversionRate,
    cache: ResultCache,
}

impl Inner {
    async fn lookup(self: Arc<Self>, raw_query: String) -> Result<Lookup, FetchError> {
        let key = normalize_query(&raw_query);
        let this = self.clone();
        self.cache
            .get_or_resolve(&key, || async move {
                let url = this.search.url_for(&raw_query);
                let body = this.fetcher.fetch(&url).await?;
                let ctx = ExtractContext::new(url, Utc::now());
                Ok(this.strategy.extract(&body, &ctx))
            })
            .await
    }
}

/// Cheap to clone; clones share the cache.
#[derive(Clone)]
pub struct LiveResolver {
    inner: Arc<Inner>,
}

impl LiveResolver {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        strategy: Arc<dyn ExtractionStrategy>,
        search: SearchEndpoint,
        rate: ConversionRate,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                fetcher,
                strategy,
                search,
                rate,
                cache: ResultCache::new(),
            }),
        }
    }

    pub fn cache(&self) -> &ResultCache {
        &self.inner.cache
    }

    /// Resolve `query`. `reference_price` is the target-currency price the
    /// overlay is comparing against; without it profit fields stay empty.
    ///
    /// The lookup runs on its own task: if the caller goes away mid-fetch the
    /// cache entry is still written.
    pub async fn resolve(
        &self,
        query: &str,
        reference_price: Option<f64>,
    ) -> Result<ResolutionResult, FetchError> {
        let qid = short_hash(query, 6);
        if normalize_query(query).is_empty() {
            tracing::debug!(target: "resolver", %qid, "empty query");
            return Ok(ResolutionResult::NotFound);
        }

        let task = tokio::spawn(self.inner.clone().lookup(query.to_string()));
        let lookup = match task.await {
            Ok(res) => res?,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                return Err(FetchError::connection(
                    self.inner.search.url.as_str(),
                    format!("lookup task aborted: {e}"),
                ))
            }
        };

        if lookup.from_cache {
            counter!("resolver_cache_hits_total").increment(1);
        } else {
            counter!("resolver_cache_misses_total").increment(1);
        }

        let Some(record) = lookup.resolution.record else {
            tracing::info!(target: "resolver", %qid, cached = lookup.from_cache, "not found");
            return Ok(ResolutionResult::NotFound);
        };

        let converted_price = self
            .inner
            .rate
            .convert(record.price_minor_units, record.currency);
        let profit = reference_price
            .filter(|p| p.is_finite())
            .map(|reference| compute_profit(reference, converted_price));

        tracing::info!(
            target: "resolver",
            %qid,
            item_id = %record.item_id,
            cached = lookup.from_cache,
            converted_price,
            tier = ?profit.map(|p| p.tier),
            "resolved"
        );

        Ok(ResolutionResult::Found(Box::new(ResolvedListing {
            record,
            converted_price,
            profit,
        })))
    }
}
