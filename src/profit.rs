// src/profit.rs
//! Currency conversion, profit and tier classification.
//! Pure, no I/O.

use serde::{Deserialize, Serialize};

use crate::model::Currency;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    Excellent,
    Good,
    Marginal,
    Poor,
}

impl Tier {
    /// Bands are inclusive at their lower bound.
    pub fn from_percent(percent: i64) -> Self {
        match percent {
            p if p >= 50 => Tier::Excellent,
            p if p >= 20 => Tier::Good,
            p if p >= 10 => Tier::Marginal,
            _ => Tier::Poor,
        }
    }
}

/// Source-currency units per one target-currency unit (e.g. 151.5 JPY per USD).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConversionRate(f64);

impl ConversionRate {
    pub fn new(rate: f64) -> Option<Self> {
        (rate.is_finite() && rate > 0.0).then_some(Self(rate))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Converted amount, rounded to cents.
    pub fn convert(self, minor_units: i64, currency: Currency) -> f64 {
        round_cents(currency.to_major(minor_units) / self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Profit {
    pub profit: f64,
    /// `None` when the converted price is zero.
    pub profit_percent: Option<i64>,
    pub tier: Tier,
}

/// `reference - converted`, with the percentage taken against `converted`.
pub fn compute_profit(reference_price: f64, converted_price: f64) -> Profit {
    let profit = round_cents(reference_price - converted_price);
    if converted_price == 0.0 || !converted_price.is_finite() {
        return Profit {
            profit,
            profit_percent: None,
            tier: Tier::Poor,
        };
    }
    let percent = (profit / converted_price * 100.0).round() as i64;
    Profit {
        profit,
        profit_percent: Some(percent),
        tier: Tier::from_percent(percent),
    }
}

pub fn round_cents(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
