// src/model.rs
//! Listing records as observed on the upstream marketplace.

use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// Currency the upstream publishes prices in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Jpy,
}

impl Currency {
    /// Number of decimal digits between the major and the minor unit.
    pub fn minor_unit_exponent(self) -> u32 {
        match self {
            Currency::Jpy => 0,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Currency::Jpy => "JPY",
        }
    }

    /// Minor units → major units as a float, for conversion only.
    pub fn to_major(self, minor: i64) -> f64 {
        minor as f64 / 10f64.powi(self.minor_unit_exponent() as i32)
    }
}

/// Tri-state stock flag. `Unknown` means no indicator was found,
/// which is not the same thing as out of stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockStatus {
    InStock,
    OutOfStock,
    #[default]
    Unknown,
}

/// One observed marketplace item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub item_id: String,
    pub title: String,
    pub price_minor_units: i64,
    pub currency: Currency,
    pub in_stock: StockStatus,
    /// Free-text location label, empty when the page has none.
    #[serde(default)]
    pub store: String,
    pub link: String,
    pub published_at: DateTime<Utc>,
}

/// Strip query and fragment so tracking parameters do not split one listing in two.
pub fn canonical_link(link: &Url) -> Url {
    let mut out = link.clone();
    out.set_query(None);
    out.set_fragment(None);
    out
}

/// Derive the stable item id from a canonical link.
///
/// 1. first capture group of `code_pattern`, when given and matching
/// 2. last non-empty path segment
/// 3. 16 hex chars of SHA-256 over the link
pub fn item_id_from_link(link: &Url, code_pattern: Option<&Regex>) -> String {
    let canonical = canonical_link(link);
    let s = canonical.as_str();

    if let Some(re) = code_pattern {
        if let Some(code) = re
            .captures(s)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim())
            .filter(|m| !m.is_empty())
        {
            return code.to_string();
        }
    }

    if let Some(seg) = canonical
        .path_segments()
        .and_then(|segs| segs.filter(|p| !p.is_empty()).last())
    {
        let stem = seg.split('.').next().unwrap_or(seg);
        if !stem.is_empty() {
            return stem.to_string();
        }
    }

    short_hash(s, 8)
}

/// Hex prefix of SHA-256, `bytes` bytes long.
pub fn short_hash(text: &str, bytes: usize) -> String {
    use sha2::{Digest, Sha256};
    use std::fmt::Write as _;

    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(bytes * 2);
    for b in digest.iter().take(bytes) {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
