// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod model;

// Upstream access
pub mod extract;
pub mod shaper;

// Live lookups
pub mod cache;
pub mod profit;
pub mod resolver;

// Feed monitoring
pub mod monitor;
pub mod notify;
pub mod seen;

pub mod api;
pub mod config;
pub mod metrics;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::config::AppConfig;
pub use crate::model::{Currency, ListingRecord, StockStatus};
pub use crate::monitor::{FeedMonitor, MonitorHandle};
pub use crate::notify::{NewItemEvent, NotifierMux};
pub use crate::resolver::{LiveResolver, ResolutionResult};
pub use crate::shaper::{FetchError, FetchErrorKind, Fetcher, RequestShaper};
