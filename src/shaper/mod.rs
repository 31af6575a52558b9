// src/shaper/mod.rs
//! Request shaping: identity headers, process-wide spacing, error taxonomy.
//!
//! The shaper never retries. The feed monitor retries on its next tick and the
//! live resolver leaves the retry decision to the user.

pub mod gate;
pub mod identity;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::{counter, histogram};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use reqwest::{Client, Response, Url};
use serde::Serialize;

pub use gate::MinIntervalGate;
pub use identity::{Identity, IdentityPool};

pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FetchErrorKind {
    Timeout,
    HttpStatus,
    Connection,
}

impl FetchErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FetchErrorKind::Timeout => "timeout",
            FetchErrorKind::HttpStatus => "http_status",
            FetchErrorKind::Connection => "connection",
        }
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upstream fetch failure, surfaced as-is to callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} error fetching {url}: {detail}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub url: String,
    /// Present for `HttpStatus`.
    pub status: Option<u16>,
    pub detail: String,
}

impl FetchError {
    pub fn timeout(url: &str, detail: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Timeout,
            url: url.to_string(),
            status: None,
            detail: detail.into(),
        }
    }

    pub fn connection(url: &str, detail: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Connection,
            url: url.to_string(),
            status: None,
            detail: detail.into(),
        }
    }

    pub fn http_status(url: &str, status: u16) -> Self {
        Self {
            kind: FetchErrorKind::HttpStatus,
            url: url.to_string(),
            status: Some(status),
            detail: format!("upstream answered {status}"),
        }
    }

    fn from_reqwest(url: &str, e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::timeout(url, e.to_string())
        } else if let Some(status) = e.status() {
            Self::http_status(url, status.as_u16())
        } else {
            Self::connection(url, e.to_string())
        }
    }
}

/// Anything that can turn a URL into a document body.
/// `RequestShaper` is the production implementation; tests plug in fakes.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<String, FetchError>;
}

#[derive(Debug, Clone)]
pub struct ShaperConfig {
    pub min_interval: Duration,
    pub timeout: Duration,
    pub identities: Vec<Identity>,
}

impl Default for ShaperConfig {
    fn default() -> Self {
        Self {
            min_interval: DEFAULT_MIN_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            identities: Vec::new(),
        }
    }
}

pub struct RequestShaper {
    client: Client,
    gate: Arc<MinIntervalGate>,
    identities: IdentityPool,
}

impl RequestShaper {
    /// Build a shaper with its own gate.
    pub fn new(cfg: ShaperConfig) -> anyhow::Result<Self> {
        let gate = Arc::new(MinIntervalGate::new(cfg.min_interval));
        Self::with_gate(cfg, gate)
    }

    /// Build a shaper around an existing gate, so several shapers share one token.
    pub fn with_gate(cfg: ShaperConfig, gate: Arc<MinIntervalGate>) -> anyhow::Result<Self> {
        use anyhow::Context;

        let client = Client::builder()
            .timeout(cfg.timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("building upstream http client")?;

        Ok(Self {
            client,
            gate,
            identities: IdentityPool::new(cfg.identities),
        })
    }

    pub fn gate(&self) -> &Arc<MinIntervalGate> {
        &self.gate
    }

    /// Attach the next identity, wait for the gate, send, and map non-2xx to an error.
    pub async fn shape_and_send(&self, url: &Url) -> Result<Response, FetchError> {
        let id = self.identities.next_identity();
        let request = self
            .client
            .get(url.clone())
            .header(USER_AGENT, &id.user_agent)
            .header(ACCEPT_LANGUAGE, &id.accept_language)
            .header(REFERER, &id.referer)
            .header(ACCEPT, ACCEPT_HTML);

        let waited = self.gate.wait_turn().await;
        histogram!("shaper_wait_ms").record(waited.as_secs_f64() * 1_000.0);
        counter!("shaper_requests_total").increment(1);
        tracing::debug!(target: "shaper", url = %url, waited_ms = waited.as_millis() as u64, "dispatch");

        let resp = request.send().await.map_err(|e| {
            let err = FetchError::from_reqwest(url.as_str(), &e);
            record_error(&err);
            err
        })?;

        let status = resp.status();
        if !status.is_success() {
            let err = FetchError::http_status(url.as_str(), status.as_u16());
            record_error(&err);
            return Err(err);
        }
        Ok(resp)
    }
}

#[async_trait]
impl Fetcher for RequestShaper {
    async fn fetch(&self, url: &Url) -> Result<String, FetchError> {
        let resp = self.shape_and_send(url).await?;
        resp.text().await.map_err(|e| {
            let err = FetchError::from_reqwest(url.as_str(), &e);
            record_error(&err);
            err
        })
    }
}

fn record_error(err: &FetchError) {
    counter!("shaper_errors_total", "kind" => err.kind.as_str()).increment(1);
    tracing::warn!(target: "shaper", kind = %err.kind, url = %err.url, status = ?err.status, "upstream fetch failed");
}
