// tests/common/mod.rs
//
// Shared fakes for integration tests.
#![allow(dead_code)]

use chrono::{DateTime, Utc};

use listing_monitor::extract::{ExtractContext, ExtractionStrategy, Extracted};
use listing_monitor::model::{Currency, ListingRecord, StockStatus};

pub fn record(id: &str, observed_at: DateTime<Utc>) -> ListingRecord {
    ListingRecord {
        item_id: id.to_string(),
        title: format!("card {id}"),
        price_minor_units: 1_000,
        currency: Currency::Jpy,
        in_stock: StockStatus::InStock,
        store: String::new(),
        link: format!("https://shop.test/product/{id}"),
        published_at: observed_at,
    }
}

/// Body is a comma separated id list; an id starting with `!` is malformed.
pub struct IdListStrategy;

impl ExtractionStrategy for IdListStrategy {
    fn name(&self) -> &'static str {
        "id-list"
    }

    fn extract(&self, document: &str, ctx: &ExtractContext) -> Option<ListingRecord> {
        self.extract_many(document, ctx).records.into_iter().next()
    }

    fn extract_many(&self, document: &str, ctx: &ExtractContext) -> Extracted {
        let mut out = Extracted::default();
        for id in document.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if id.starts_with('!') {
                out.skipped += 1;
            } else {
                out.records.push(record(id, ctx.observed_at));
            }
        }
        out
    }
}
