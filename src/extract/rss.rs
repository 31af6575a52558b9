// src/extract/rss.rs
//! New-arrivals RSS feeds. Price, stock and store come from optional item
//! elements, or from the description text when the shop only publishes prose.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use quick_xml::de::from_str;
use regex::Regex;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use super::{
    collect_records, ExtractContext, ExtractionRules, ExtractionStrategy, Extracted, RawRecord,
};
use crate::model::ListingRecord;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    price: Option<String>,
    stock: Option<String>,
    store: Option<String>,
}

// Sign and kanji multipliers stay inside the match so `parse_price` can refuse them.
static RE_PRICE_IN_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"[¥￥]\s*[-－−▲]?[0-9０-９][0-9０-９,，.〇一二三四五六七八九十百千万億]*|[-－−▲]?[0-9０-９〇一二三四五六七八九十百千万億][0-9０-９,，.〇一二三四五六七八九十百千万億]*\s*円",
    )
    .expect("price-in-text regex")
});

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    let odt = OffsetDateTime::parse(ts.trim(), &Rfc2822).ok()?;
    DateTime::<Utc>::from_timestamp(odt.unix_timestamp(), odt.nanosecond())
}

pub struct RssFeedStrategy {
    rules: ExtractionRules,
}

impl RssFeedStrategy {
    pub fn new(rules: ExtractionRules) -> Self {
        Self { rules }
    }

    fn parse(document: &str) -> Result<Vec<RawRecord>, quick_xml::DeError> {
        let rss: Rss = from_str(&scrub_html_entities_for_xml(document))?;
        Ok(rss.channel.item.into_iter().map(raw_from_item).collect())
    }
}

fn raw_from_item(it: Item) -> RawRecord {
    let description = it.description.unwrap_or_default();
    let price = it.price.or_else(|| {
        RE_PRICE_IN_TEXT
            .find(&description)
            .map(|m| m.as_str().to_string())
    });
    let stock_text = match it.stock {
        Some(s) => Some(s),
        None if description.is_empty() => None,
        None => Some(description.clone()),
    };

    RawRecord {
        title: it.title,
        price,
        link: it.link,
        stock_text,
        store: it.store,
        published_at: it.pub_date.as_deref().and_then(parse_rfc2822),
    }
}

impl ExtractionStrategy for RssFeedStrategy {
    fn name(&self) -> &'static str {
        "rss"
    }

    fn extract(&self, document: &str, ctx: &ExtractContext) -> Option<ListingRecord> {
        Self::parse(document)
            .ok()?
            .into_iter()
            .find_map(|raw| super::build_record(raw, ctx, &self.rules).ok())
    }

    fn extract_many(&self, document: &str, ctx: &ExtractContext) -> Extracted {
        match Self::parse(document) {
            Ok(raws) => collect_records(self.name(), raws, ctx, &self.rules),
            Err(e) => {
                tracing::warn!(target: "extract", strategy = "rss", error = %e, "feed document unparseable");
                Extracted {
                    document_error: Some(e.to_string()),
                    ..Default::default()
                }
            }
        }
    }
}

/// quick-xml only knows the five XML entities; shops love `&nbsp;` and friends.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&yen;", "¥")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
}
