// src/extract/html.rs
//! CSS-selector strategy for marketplace listing and search pages.

use anyhow::{anyhow, Result};
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;

use super::{
    collect_records, ExtractContext, ExtractionRules, ExtractionStrategy, Extracted, RawRecord,
};
use crate::model::ListingRecord;

/// Selector strings as written in config. Item-level selectors are evaluated
/// inside each `item` element.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct HtmlSelectors {
    #[serde(default = "default_item")]
    pub item: String,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_price")]
    pub price: String,
    /// Empty means "use the item element's own href".
    #[serde(default = "default_link")]
    pub link: String,
    /// Empty means "look for stock phrases anywhere in the item".
    #[serde(default)]
    pub stock: String,
    #[serde(default)]
    pub store: String,
}

fn default_item() -> String {
    ".item-list .item".into()
}
fn default_title() -> String {
    ".item-name".into()
}
fn default_price() -> String {
    ".item-price".into()
}
fn default_link() -> String {
    "a[href]".into()
}

impl Default for HtmlSelectors {
    fn default() -> Self {
        Self {
            item: default_item(),
            title: default_title(),
            price: default_price(),
            link: default_link(),
            stock: String::new(),
            store: String::new(),
        }
    }
}

struct Compiled {
    item: Selector,
    title: Selector,
    price: Selector,
    link: Option<Selector>,
    stock: Option<Selector>,
    store: Option<Selector>,
}

pub struct HtmlListingStrategy {
    sel: Compiled,
    rules: ExtractionRules,
}

fn compile(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| anyhow!("invalid css selector `{s}`: {e:?}"))
}

fn compile_opt(s: &str) -> Result<Option<Selector>> {
    if s.trim().is_empty() {
        Ok(None)
    } else {
        compile(s).map(Some)
    }
}

impl HtmlListingStrategy {
    pub fn new(selectors: &HtmlSelectors, rules: ExtractionRules) -> Result<Self> {
        Ok(Self {
            sel: Compiled {
                item: compile(&selectors.item)?,
                title: compile(&selectors.title)?,
                price: compile(&selectors.price)?,
                link: compile_opt(&selectors.link)?,
                stock: compile_opt(&selectors.stock)?,
                store: compile_opt(&selectors.store)?,
            },
            rules,
        })
    }

    fn raw_from_item(&self, item: ElementRef<'_>) -> RawRecord {
        let link = match &self.sel.link {
            Some(sel) => item
                .select(sel)
                .find_map(|a| a.value().attr("href"))
                .or_else(|| item.value().attr("href")),
            None => item.value().attr("href"),
        };

        let stock_text = match &self.sel.stock {
            Some(sel) => item.select(sel).next().map(element_text),
            None => Some(element_text(item)),
        };

        RawRecord {
            title: first_text(item, &self.sel.title),
            price: first_text(item, &self.sel.price),
            link: link.map(str::to_string),
            stock_text,
            store: self.sel.store.as_ref().and_then(|s| first_text(item, s)),
            published_at: None,
        }
    }

    fn raws<'a>(&'a self, doc: &'a Html) -> impl Iterator<Item = RawRecord> + 'a {
        doc.select(&self.sel.item).map(|item| self.raw_from_item(item))
    }
}

impl ExtractionStrategy for HtmlListingStrategy {
    fn name(&self) -> &'static str {
        "html"
    }

    fn extract(&self, document: &str, ctx: &ExtractContext) -> Option<ListingRecord> {
        let doc = Html::parse_document(document);
        // Upstream ranking is trusted: first well-formed result wins.
        let first = self.raws(&doc).find_map(|raw| {
            super::build_record(raw, ctx, &self.rules)
                .map_err(|e| tracing::debug!(target: "extract", error = %e, "search result skipped"))
                .ok()
        });
        first
    }

    fn extract_many(&self, document: &str, ctx: &ExtractContext) -> Extracted {
        let doc = Html::parse_document(document);
        let raws: Vec<RawRecord> = self.raws(&doc).collect();
        collect_records(self.name(), raws, ctx, &self.rules)
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ")
}

fn first_text(scope: ElementRef<'_>, sel: &Selector) -> Option<String> {
    scope
        .select(sel)
        .next()
        .map(element_text)
        .filter(|t| !t.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StockStatus;
    use chrono::Utc;
    use reqwest::Url;

    const PAGE: &str = r#"
        <html><body><ul class="item-list">
          <li class="item">
            <a href="/product/101"><span class="item-name">ピカチュウ ex SAR</span></a>
            <span class="item-price">￥２，８００</span>
            <span class="stock">在庫あり</span>
            <span class="shop">秋葉原店</span>
          </li>
          <li class="item">
            <a href="/product/102"><span class="item-name">Mew ex</span></a>
            <span class="item-price">価格未定</span>
          </li>
          <li class="item">
            <a href="https://shop.test/product/103?ref=top"><span class="item-name">Eevee</span></a>
            <span class="item-price">1,200円</span>
            <span class="stock">SOLD OUT</span>
          </li>
        </ul></body></html>"#;

    fn strategy() -> HtmlListingStrategy {
        let sel = HtmlSelectors {
            stock: ".stock".into(),
            store: ".shop".into(),
            ..Default::default()
        };
        HtmlListingStrategy::new(&sel, ExtractionRules::default()).unwrap()
    }

    fn ctx() -> ExtractContext {
        ExtractContext::new(Url::parse("https://shop.test/new").unwrap(), Utc::now())
    }

    #[test]
    fn many_skips_bad_price_and_keeps_order() {
        let out = strategy().extract_many(PAGE, &ctx());
        assert_eq!(out.skipped, 1);
        let ids: Vec<_> = out.records.iter().map(|r| r.item_id.as_str()).collect();
        assert_eq!(ids, vec!["101", "103"]);

        let first = &out.records[0];
        assert_eq!(first.price_minor_units, 2800);
        assert_eq!(first.in_stock, StockStatus::InStock);
        assert_eq!(first.store, "秋葉原店");
        assert_eq!(first.link, "https://shop.test/product/101");

        assert_eq!(out.records[1].in_stock, StockStatus::OutOfStock);
        assert_eq!(out.records[1].store, "");
    }

    #[test]
    fn single_extract_returns_first_well_formed() {
        let r = strategy().extract(PAGE, &ctx()).unwrap();
        assert_eq!(r.item_id, "101");
    }

    #[test]
    fn no_items_yields_nothing() {
        let s = strategy();
        assert!(s.extract("<html><p>0件</p></html>", &ctx()).is_none());
        let out = s.extract_many("<html></html>", &ctx());
        assert!(out.records.is_empty());
        assert_eq!(out.skipped, 0);
    }

    #[test]
    fn invalid_selector_is_rejected() {
        let sel = HtmlSelectors {
            item: "li[[".into(),
            ..Default::default()
        };
        assert!(HtmlListingStrategy::new(&sel, ExtractionRules::default()).is_err());
    }
}
