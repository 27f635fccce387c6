use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::StockId;

/// Where a quote came from: entered by hand or pulled from a market
/// data feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    Manual,
    Fetched,
}

impl PriceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceSource::Manual => "manual",
            PriceSource::Fetched => "fetched",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "manual" => Some(PriceSource::Manual),
            "fetched" => Some(PriceSource::Fetched),
            _ => None,
        }
    }
}

impl std::fmt::Display for PriceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A point-in-time quote for a stock. At most one price exists per
/// (stock, timestamp, source) tuple; the first record wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Price {
    pub stock_id: StockId,
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
    pub source: PriceSource,
}

impl Price {
    pub fn new(
        stock_id: StockId,
        timestamp: DateTime<Utc>,
        price: Decimal,
        source: PriceSource,
    ) -> Self {
        Self {
            stock_id,
            timestamp,
            price,
            source,
        }
    }
}
