// tests/resolver_cache.rs
//
// Live Resolver end to end over the HTML strategy and a counting fake fetcher.
//
// Covered:
// - found: conversion, profit, tier from a real search page fixture
// - not found: cached, second call skips the fetch
// - repeated / differently spaced queries hit the same entry
// - concurrent identical queries share one upstream fetch
// - fetch failure is an error, is not cached, and a retry goes upstream

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Url;

use listing_monitor::config::SearchEndpoint;
use listing_monitor::extract::{ExtractionRules, HtmlListingStrategy, HtmlSelectors};
use listing_monitor::model::StockStatus;
use listing_monitor::profit::{ConversionRate, Tier};
use listing_monitor::resolver::{LiveResolver, ResolutionResult};
use listing_monitor::shaper::{FetchError, FetchErrorKind, Fetcher};

const SEARCH_PAGE: &str = include_str!("fixtures/search_results.html");
const EMPTY_PAGE: &str = include_str!("fixtures/search_empty.html");

struct FakeSearch {
    body: Mutex<Result<String, FetchError>>,
    delay: Duration,
    calls: AtomicUsize,
    urls: Mutex<Vec<String>>,
}

impl FakeSearch {
    fn serving(body: &str) -> Arc<Self> {
        Arc::new(Self {
            body: Mutex::new(Ok(body.to_string())),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
        })
    }

    fn slow(body: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            body: Mutex::new(Ok(body.to_string())),
            delay,
            calls: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
        })
    }

    fn set(&self, body: Result<&str, FetchError>) {
        *self.body.lock() = body.map(str::to_string);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for FakeSearch {
    async fn fetch(&self, url: &Url) -> Result<String, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().push(url.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.body.lock().clone()
    }
}

fn resolver(fetcher: Arc<FakeSearch>) -> LiveResolver {
    let selectors = HtmlSelectors {
        stock: ".item-stock".into(),
        store: ".item-store".into(),
        ..Default::default()
    };
    let strategy = HtmlListingStrategy::new(&selectors, ExtractionRules::default()).unwrap();
    LiveResolver::new(
        fetcher,
        Arc::new(strategy),
        SearchEndpoint {
            url: Url::parse("https://shop.test/search").unwrap(),
            query_param: "keyword".into(),
        },
        ConversionRate::new(151.5).unwrap(),
    )
}

#[tokio::test]
async fn found_listing_is_converted_and_tiered() {
    let fetcher = FakeSearch::serving(SEARCH_PAGE);
    let r = resolver(fetcher.clone());

    let res = r.resolve("Pikachu card", Some(41.95)).await.unwrap();
    let ResolutionResult::Found(found) = res else {
        panic!("expected a match");
    };

    // First result has no readable price; the second one is taken.
    assert_eq!(found.record.item_id, "2002");
    assert_eq!(found.record.title, "ピカチュウ ex SAR");
    assert_eq!(found.record.price_minor_units, 2_800);
    assert_eq!(found.record.in_stock, StockStatus::InStock);
    assert_eq!(found.record.store, "秋葉原店");
    assert_eq!(found.record.link, "https://shop.test/product/2002");
    assert_eq!(found.converted_price, 18.48);

    let profit = found.profit.expect("reference price given");
    assert_eq!(profit.profit, 23.47);
    assert_eq!(profit.profit_percent, Some(127));
    assert_eq!(profit.tier, Tier::Excellent);

    assert_eq!(
        fetcher.urls.lock().as_slice(),
        ["https://shop.test/search?keyword=Pikachu+card".to_string()]
    );
}

#[tokio::test]
async fn no_reference_price_leaves_profit_empty() {
    let r = resolver(FakeSearch::serving(SEARCH_PAGE));
    let res = r.resolve("pikachu", None).await.unwrap();
    let resp = res.to_response();
    assert!(resp.found);
    assert_eq!(resp.converted_price, Some(18.48));
    assert!(resp.profit.is_none() && resp.tier.is_none());
}

#[tokio::test]
async fn not_found_is_cached() {
    let fetcher = FakeSearch::serving(EMPTY_PAGE);
    let r = resolver(fetcher.clone());

    assert_eq!(r.resolve("nothing here", Some(10.0)).await.unwrap(), ResolutionResult::NotFound);
    assert_eq!(r.resolve("nothing here", Some(10.0)).await.unwrap(), ResolutionResult::NotFound);
    assert_eq!(fetcher.calls(), 1);

    let cached = r.cache().peek("nothing here").expect("cached marker");
    assert!(!cached.found());
}

#[tokio::test]
async fn repeated_query_is_idempotent_and_normalized() {
    let fetcher = FakeSearch::serving(SEARCH_PAGE);
    let r = resolver(fetcher.clone());

    let a = r.resolve("Pikachu card", Some(41.95)).await.unwrap();
    let b = r.resolve("  pikachu   CARD ", Some(41.95)).await.unwrap();
    assert_eq!(a, b);
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(r.cache().len(), 1);

    // Profit is per call; the cached record is shared.
    let c = r.resolve("pikachu card", Some(21.25)).await.unwrap();
    let ResolutionResult::Found(c) = c else { panic!("expected a match") };
    assert_eq!(c.profit.map(|p| p.tier), Some(Tier::Marginal));
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_identical_queries_share_one_fetch() {
    let fetcher = FakeSearch::slow(SEARCH_PAGE, Duration::from_secs(3));
    let r = resolver(fetcher.clone());

    let mut tasks = Vec::new();
    for _ in 0..5 {
        let r = r.clone();
        tasks.push(tokio::spawn(async move { r.resolve("Pikachu card", Some(41.95)).await }));
    }
    let mut results = Vec::new();
    for t in tasks {
        results.push(t.await.unwrap().unwrap());
    }

    assert_eq!(fetcher.calls(), 1);
    assert!(results.windows(2).all(|w| w[0] == w[1]));
    assert!(results[0].found());
}

#[tokio::test]
async fn fetch_failure_is_an_error_and_is_retried_later() {
    let fetcher = FakeSearch::serving(SEARCH_PAGE);
    fetcher.set(Err(FetchError::http_status("https://shop.test/search", 503)));
    let r = resolver(fetcher.clone());

    let err = r.resolve("Pikachu card", Some(41.95)).await.unwrap_err();
    assert_eq!(err.kind, FetchErrorKind::HttpStatus);
    assert_eq!(err.status, Some(503));
    assert!(r.cache().is_empty());

    fetcher.set(Ok(SEARCH_PAGE));
    assert!(r.resolve("Pikachu card", Some(41.95)).await.unwrap().found());
    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test]
async fn empty_query_never_goes_upstream() {
    let fetcher = FakeSearch::serving(SEARCH_PAGE);
    let r = resolver(fetcher.clone());
    assert_eq!(r.resolve(" \u{3000} ", None).await.unwrap(), ResolutionResult::NotFound);
    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn abandoned_lookup_still_fills_the_cache() {
    let fetcher = FakeSearch::slow(SEARCH_PAGE, Duration::from_secs(3));
    let r = resolver(fetcher.clone());

    let caller = {
        let r = r.clone();
        tokio::spawn(async move { r.resolve("Pikachu card", None).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    caller.abort();

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(r.cache().peek("pikachu card").is_some_and(|c| c.found()));
    assert!(r.resolve("Pikachu card", None).await.unwrap().found());
    assert_eq!(fetcher.calls(), 1);
}
