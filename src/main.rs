//! listing-monitor binary entrypoint.
//! Wires shaper, strategy, resolver and feed monitor, then serves the overlay API.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use listing_monitor::{
    api::{self, AppState},
    config::AppConfig,
    metrics::Metrics,
    monitor::{spawn_monitor, FeedMonitor, MonitorHandle},
    notify::{NotifierMux, RecentItems, WebhookSink},
    resolver::LiveResolver,
    seen::JsonFileSeenStore,
    shaper::RequestShaper,
};

/// `RUST_LOG` picks the filter; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("listing_monitor=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

async fn shutdown_signal(monitor: MonitorHandle) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("ctrl-c handler failed: {e}");
    }
    tracing::info!("shutting down");
    monitor.shutdown();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::load_default()?;
    let metrics = Metrics::init()?;

    // One shaper, one gate: feed polling and live lookups share the rate limit.
    let shaper = Arc::new(RequestShaper::new(cfg.shaper_config())?);
    let strategy = cfg.build_strategy()?;

    let resolver = LiveResolver::new(
        shaper.clone(),
        strategy.clone(),
        cfg.search_endpoint()?,
        cfg.conversion_rate()?,
    );

    let recent = Arc::new(RecentItems::with_capacity(cfg.recent_capacity));
    let mut notifier = NotifierMux::new().with(recent.clone());
    if let Some(url) = &cfg.webhook_url {
        notifier.push(Arc::new(WebhookSink::new(url.clone())));
    }

    let store = Arc::new(JsonFileSeenStore::new(&cfg.seen_set_path));
    let monitor = FeedMonitor::load(
        shaper.clone(),
        strategy,
        cfg.feed_endpoint()?,
        cfg.scopes.clone(),
        store,
        notifier,
    )
    .await
    .with_context(|| format!("loading seen-set from {}", cfg.seen_set_path.display()))?;
    let (monitor_handle, monitor_task) = spawn_monitor(Arc::new(monitor), cfg.poll_interval());

    let state = AppState {
        resolver,
        monitor: Some(monitor_handle.clone()),
        recent,
    };
    let app = api::router(state).merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("binding {}", cfg.bind_addr))?;
    tracing::info!(addr = %cfg.bind_addr, scopes = ?cfg.scopes, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(monitor_handle))
        .await
        .context("http server")?;

    let _ = monitor_task.await;
    Ok(())
}
