// src/extract/mod.rs
//! Upstream-specific parsing of fetched documents into `ListingRecord`s.
//!
//! Strategies are pure: no I/O, no clocks. Everything time-dependent comes in
//! through `ExtractContext`.

pub mod html;
pub mod price;
pub mod rss;

use chrono::{DateTime, Utc};
use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use serde::Deserialize;

use crate::model::{canonical_link, item_id_from_link, Currency, ListingRecord, StockStatus};

pub use html::{HtmlListingStrategy, HtmlSelectors};
pub use rss::RssFeedStrategy;

/// Per-record failure. Never escapes `extract_many`; the record is skipped and counted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("unparseable price `{0}`")]
    BadPrice(String),
    #[error("bad link `{0}`")]
    BadLink(String),
}

/// Inputs a strategy needs besides the document itself.
#[derive(Debug, Clone)]
pub struct ExtractContext {
    /// Address the document was fetched from; relative links resolve against it.
    pub base_url: Url,
    /// Fallback timestamp for records without their own publication date.
    pub observed_at: DateTime<Utc>,
}

impl ExtractContext {
    pub fn new(base_url: Url, observed_at: DateTime<Utc>) -> Self {
        Self {
            base_url,
            observed_at,
        }
    }
}

/// Result of a multi-record extraction.
#[derive(Debug, Clone, Default)]
pub struct Extracted {
    pub records: Vec<ListingRecord>,
    /// Records dropped because they were malformed.
    pub skipped: usize,
    /// Set when the document as a whole could not be parsed.
    pub document_error: Option<String>,
}

pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// First well-formed record of a search/detail document.
    fn extract(&self, document: &str, ctx: &ExtractContext) -> Option<ListingRecord>;

    /// Every well-formed record of a feed/listing document, in document order.
    fn extract_many(&self, document: &str, ctx: &ExtractContext) -> Extracted;
}

/// Text fragments that mark stock state on one upstream.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct StockPhrases {
    #[serde(default = "default_in_stock")]
    pub in_stock: Vec<String>,
    #[serde(default = "default_out_of_stock")]
    pub out_of_stock: Vec<String>,
}

impl Default for StockPhrases {
    fn default() -> Self {
        Self {
            in_stock: default_in_stock(),
            out_of_stock: default_out_of_stock(),
        }
    }
}

fn default_in_stock() -> Vec<String> {
    ["在庫あり", "在庫有り", "カートに入れる", "in stock", "add to cart"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_out_of_stock() -> Vec<String> {
    ["在庫なし", "在庫切れ", "売り切れ", "品切れ", "sold out", "out of stock"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl StockPhrases {
    /// Out-of-stock phrases win when both kinds appear.
    pub fn classify(&self, text: &str) -> StockStatus {
        let hay = text.to_lowercase();
        let hit = |phrases: &[String]| {
            phrases
                .iter()
                .any(|p| !p.is_empty() && hay.contains(&p.to_lowercase()))
        };
        if hit(&self.out_of_stock) {
            StockStatus::OutOfStock
        } else if hit(&self.in_stock) {
            StockStatus::InStock
        } else {
            StockStatus::Unknown
        }
    }
}

/// Rules shared by every strategy of one upstream.
#[derive(Debug, Clone, Default)]
pub struct ExtractionRules {
    pub currency: Currency,
    pub stock_phrases: StockPhrases,
    pub item_code_pattern: Option<Regex>,
}

/// Raw strings pulled out of one record before validation.
#[derive(Debug, Default)]
pub(crate) struct RawRecord {
    pub title: Option<String>,
    pub price: Option<String>,
    pub link: Option<String>,
    pub stock_text: Option<String>,
    pub store: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

pub(crate) fn build_record(
    raw: RawRecord,
    ctx: &ExtractContext,
    rules: &ExtractionRules,
) -> Result<ListingRecord, ExtractionError> {
    let title = raw
        .title
        .as_deref()
        .map(normalize_text)
        .filter(|t| !t.is_empty())
        .ok_or(ExtractionError::MissingField("title"))?;

    let price_raw = raw
        .price
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or(ExtractionError::MissingField("price"))?;
    let price_minor_units = price::parse_price(price_raw, rules.currency)?;

    let href = raw
        .link
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .ok_or(ExtractionError::MissingField("link"))?;
    let absolute = ctx
        .base_url
        .join(href)
        .map_err(|_| ExtractionError::BadLink(href.to_string()))?;
    if !matches!(absolute.scheme(), "http" | "https") {
        return Err(ExtractionError::BadLink(href.to_string()));
    }
    let link = canonical_link(&absolute);
    let item_id = item_id_from_link(&link, rules.item_code_pattern.as_ref());

    let in_stock = raw
        .stock_text
        .as_deref()
        .map(|t| rules.stock_phrases.classify(t))
        .unwrap_or_default();

    let store = raw.store.as_deref().map(normalize_text).unwrap_or_default();

    Ok(ListingRecord {
        item_id,
        title,
        price_minor_units,
        currency: rules.currency,
        in_stock,
        store,
        link: link.to_string(),
        published_at: raw.published_at.unwrap_or(ctx.observed_at),
    })
}

/// Run `build_record` over raw records, skipping and counting malformed ones.
pub(crate) fn collect_records(
    strategy: &'static str,
    raws: impl IntoIterator<Item = RawRecord>,
    ctx: &ExtractContext,
    rules: &ExtractionRules,
) -> Extracted {
    let mut out = Extracted::default();
    for (idx, raw) in raws.into_iter().enumerate() {
        match build_record(raw, ctx, rules) {
            Ok(r) => out.records.push(r),
            Err(e) => {
                out.skipped += 1;
                tracing::debug!(target: "extract", strategy, idx, error = %e, "record skipped");
            }
        }
    }
    if out.skipped > 0 {
        counter!("extract_skipped_total").increment(out.skipped as u64);
        tracing::warn!(
            target: "extract",
            strategy,
            kept = out.records.len(),
            skipped = out.skipped,
            "malformed records skipped"
        );
    }
    out
}

/// Decode entities, strip tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("ws regex"));

    let decoded = html_escape::decode_html_entities(s);
    let stripped = RE_TAGS.replace_all(&decoded, " ");
    RE_WS.replace_all(&stripped, " ").trim().to_string()
}
