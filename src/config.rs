// src/config.rs
//! Runtime configuration: TOML file + env overrides.
//!
//! Lookup order for the file:
//! 1) $LISTING_MONITOR_CONFIG
//! 2) config/monitor.toml

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use regex::Regex;
use reqwest::Url;
use serde::Deserialize;

use crate::extract::{
    ExtractionRules, ExtractionStrategy, HtmlListingStrategy, HtmlSelectors, RssFeedStrategy,
    StockPhrases,
};
use crate::model::Currency;
use crate::profit::ConversionRate;
use crate::shaper::ShaperConfig;

pub const DEFAULT_CONFIG_PATH: &str = "config/monitor.toml";
pub const ENV_CONFIG_PATH: &str = "LISTING_MONITOR_CONFIG";

/// Scope key meaning "every store"; the scope parameter is left off the feed URL.
pub const ALL_SCOPES: &str = "all";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    #[default]
    Html,
    Rss,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_min_request_interval_ms")]
    pub min_request_interval_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Source units per target unit. No default: it has to come from outside.
    #[serde(default)]
    pub conversion_rate: Option<f64>,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    pub feed_url: String,
    #[serde(default = "default_feed_scope_param")]
    pub feed_scope_param: String,
    pub search_url: String,
    #[serde(default = "default_search_query_param")]
    pub search_query_param: String,

    #[serde(default)]
    pub strategy: StrategyKind,
    #[serde(default)]
    pub selectors: HtmlSelectors,
    #[serde(default)]
    pub stock_phrases: StockPhrases,
    #[serde(default)]
    pub item_code_pattern: Option<String>,

    #[serde(default = "default_seen_set_path")]
    pub seen_set_path: PathBuf,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_recent_capacity")]
    pub recent_capacity: usize,
}

fn default_poll_interval_secs() -> u64 {
    60
}
fn default_min_request_interval_ms() -> u64 {
    2_000
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_scopes() -> Vec<String> {
    vec![ALL_SCOPES.to_string()]
}
fn default_feed_scope_param() -> String {
    "store".into()
}
fn default_search_query_param() -> String {
    "keyword".into()
}
fn default_seen_set_path() -> PathBuf {
    PathBuf::from("state/seen.json")
}
fn default_bind_addr() -> String {
    "127.0.0.1:8787".into()
}
fn default_recent_capacity() -> usize {
    200
}

impl AppConfig {
    /// Parse, apply env overrides, validate.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: AppConfig = toml::from_str(s).context("parsing monitor config toml")?;
        cfg.apply_env_overrides();
        cfg.scopes = clean_list(std::mem::take(&mut cfg.scopes));
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("loading {}", path.display()))
    }

    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            return Self::load_from(&pb);
        }
        Self::load_from(Path::new(DEFAULT_CONFIG_PATH))
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parse::<u64>("POLL_INTERVAL_SECS") {
            self.poll_interval_secs = v;
        }
        if let Some(v) = env_parse::<u64>("MIN_REQUEST_INTERVAL_MS") {
            self.min_request_interval_ms = v;
        }
        if let Some(v) = env_parse::<f64>("CONVERSION_RATE") {
            self.conversion_rate = Some(v);
        }
        if let Ok(v) = std::env::var("SCOPES") {
            self.scopes = v.split(',').map(str::to_string).collect();
        }
        if let Ok(v) = std::env::var("SEEN_SET_PATH") {
            self.seen_set_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("BIND_ADDR") {
            self.bind_addr = v;
        }
        if let Ok(v) = std::env::var("NEW_ITEM_WEBHOOK_URL") {
            self.webhook_url = Some(v).filter(|s| !s.trim().is_empty());
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            bail!("poll_interval_secs must be > 0");
        }
        if self.min_request_interval_ms == 0 {
            bail!("min_request_interval_ms must be > 0");
        }
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be > 0");
        }
        if self.scopes.is_empty() {
            bail!("scopes must not be empty");
        }
        self.conversion_rate()?;
        self.feed_endpoint()?;
        self.search_endpoint()?;
        self.extraction_rules()?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn shaper_config(&self) -> ShaperConfig {
        ShaperConfig {
            min_interval: Duration::from_millis(self.min_request_interval_ms),
            timeout: Duration::from_secs(self.request_timeout_secs),
            identities: Vec::new(),
        }
    }

    pub fn conversion_rate(&self) -> Result<ConversionRate> {
        let raw = self
            .conversion_rate
            .ok_or_else(|| anyhow!("conversion_rate is required (config or CONVERSION_RATE)"))?;
        ConversionRate::new(raw).ok_or_else(|| anyhow!("conversion_rate must be finite and > 0, got {raw}"))
    }

    pub fn feed_endpoint(&self) -> Result<FeedEndpoint> {
        Ok(FeedEndpoint {
            url: Url::parse(&self.feed_url).with_context(|| format!("feed_url `{}`", self.feed_url))?,
            scope_param: self.feed_scope_param.clone(),
        })
    }

    pub fn search_endpoint(&self) -> Result<SearchEndpoint> {
        Ok(SearchEndpoint {
            url: Url::parse(&self.search_url)
                .with_context(|| format!("search_url `{}`", self.search_url))?,
            query_param: self.search_query_param.clone(),
        })
    }

    pub fn extraction_rules(&self) -> Result<ExtractionRules> {
        let item_code_pattern = match self.item_code_pattern.as_deref().map(str::trim) {
            Some(p) if !p.is_empty() => {
                let re = Regex::new(p).with_context(|| format!("item_code_pattern `{p}`"))?;
                if re.captures_len() < 2 {
                    bail!("item_code_pattern needs one capture group");
                }
                Some(re)
            }
            _ => None,
        };
        Ok(ExtractionRules {
            currency: Currency::Jpy,
            stock_phrases: self.stock_phrases.clone(),
            item_code_pattern,
        })
    }

    pub fn build_strategy(&self) -> Result<Arc<dyn ExtractionStrategy>> {
        let rules = self.extraction_rules()?;
        Ok(match self.strategy {
            StrategyKind::Html => Arc::new(HtmlListingStrategy::new(&self.selectors, rules)?),
            StrategyKind::Rss => Arc::new(RssFeedStrategy::new(rules)),
        })
    }
}

/// Search endpoint; the raw query goes into one query parameter.
#[derive(Debug, Clone)]
pub struct SearchEndpoint {
    pub url: Url,
    pub query_param: String,
}

impl SearchEndpoint {
    pub fn url_for(&self, query: &str) -> Url {
        let mut u = self.url.clone();
        u.query_pairs_mut().append_pair(&self.query_param, query);
        u
    }
}

/// Feed endpoint; scope keys other than `all` go into one query parameter.
#[derive(Debug, Clone)]
pub struct FeedEndpoint {
    pub url: Url,
    pub scope_param: String,
}

impl FeedEndpoint {
    pub fn url_for(&self, scope: &str) -> Url {
        let mut u = self.url.clone();
        if !scope.eq_ignore_ascii_case(ALL_SCOPES) {
            u.query_pairs_mut().append_pair(&self.scope_param, scope);
        }
        u
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable env override");
            None
        }
    }
}

/// Trim, drop empties, keep first occurrence order.
fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim();
        if !t.is_empty() && !out.iter().any(|o| o == t) {
            out.push(t.to_string());
        }
    }
    out
}
