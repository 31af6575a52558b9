// tests/metrics_exposed.rs
#![cfg(feature = "strict-metrics")]
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use reqwest::Url;
use tower::ServiceExt;

use listing_monitor::config::{FeedEndpoint, SearchEndpoint};
use listing_monitor::extract::{ExtractionRules, HtmlListingStrategy, HtmlSelectors};
use listing_monitor::metrics::Metrics;
use listing_monitor::monitor::FeedMonitor;
use listing_monitor::notify::NotifierMux;
use listing_monitor::profit::ConversionRate;
use listing_monitor::resolver::LiveResolver;
use listing_monitor::seen::MemorySeenStore;
use listing_monitor::shaper::{FetchError, Fetcher};

mod common;

struct Page(&'static str);

#[async_trait]
impl Fetcher for Page {
    async fn fetch(&self, _url: &Url) -> Result<String, FetchError> {
        Ok(self.0.to_string())
    }
}

#[tokio::test]
async fn metrics_exposed_after_lookup_and_cycle() {
    // One recorder per test binary; this is the only test in it.
    let metrics = Metrics::init().expect("recorder");

    let strategy =
        HtmlListingStrategy::new(&HtmlSelectors::default(), ExtractionRules::default()).unwrap();
    let resolver = LiveResolver::new(
        Arc::new(Page(include_str!("fixtures/search_results.html"))),
        Arc::new(strategy),
        SearchEndpoint {
            url: Url::parse("https://shop.test/search").unwrap(),
            query_param: "keyword".into(),
        },
        ConversionRate::new(151.5).unwrap(),
    );
    resolver.resolve("pikachu", None).await.unwrap();
    resolver.resolve("pikachu", None).await.unwrap();

    let monitor = FeedMonitor::load(
        Arc::new(Page("X1,!bad,X2")),
        Arc::new(common::IdListStrategy),
        FeedEndpoint {
            url: Url::parse("https://shop.test/new").unwrap(),
            scope_param: "store".into(),
        },
        vec!["all".into()],
        Arc::new(MemorySeenStore::default()),
        NotifierMux::new(),
    )
    .await
    .unwrap();
    monitor.run_cycle().await;

    let resp = metrics
        .router()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let text = String::from_utf8(
        body::to_bytes(resp.into_body(), 1_048_576)
            .await
            .unwrap()
            .to_vec(),
    )
    .unwrap();

    for needle in [
        "resolver_cache_hits_total",
        "resolver_cache_misses_total",
        "monitor_cycles_total",
        "monitor_new_items_total",
        "monitor_last_cycle_ts",
    ] {
        assert!(text.contains(needle), "missing series {needle}");
    }
}
