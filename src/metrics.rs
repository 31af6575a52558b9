// src/metrics.rs
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder and describe every series we emit.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| anyhow::anyhow!("prometheus: install recorder: {e}"))?;
        describe_all();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

fn describe_all() {
    describe_counter!("shaper_requests_total", "Requests dispatched upstream.");
    describe_counter!("shaper_errors_total", "Upstream fetch failures by kind.");
    describe_histogram!("shaper_wait_ms", "Time spent waiting on the request gate.");
    describe_counter!("extract_skipped_total", "Malformed records skipped during extraction.");
    describe_counter!("monitor_cycles_total", "Feed monitor cycles started.");
    describe_counter!("monitor_cycle_failures_total", "Cycles aborted by a fetch failure.");
    describe_counter!("monitor_new_items_total", "New-item events emitted.");
    describe_gauge!("monitor_last_cycle_ts", "Unix ts of the last completed cycle.");
    describe_counter!("resolver_cache_hits_total", "Live lookups answered from cache.");
    describe_counter!("resolver_cache_misses_total", "Live lookups that went upstream.");
    describe_counter!("seen_persist_failures_total", "Failed seen-set saves.");
}
