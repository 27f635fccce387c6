use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type StockId = Uuid;

/// Longest ticker accepted, matching the widest symbols seen on US
/// exchanges (e.g. "BRK.A", "GOOGL").
pub const MAX_TICKER_LEN: usize = 8;

/// A tradable instrument. The ticker is the stock's identity and is
/// immutable once created; name, exchange and sector are descriptive
/// metadata and may be updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stock {
    pub id: StockId,
    pub ticker: String,
    pub name: String,
    pub exchange: Option<String>,
    pub sector: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Stock {
    /// Create a new stock. The ticker must already be normalized via
    /// [`normalize_ticker`].
    pub fn new(ticker: String, name: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            ticker,
            name,
            exchange: None,
            sector: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = Some(exchange.into());
        self
    }

    pub fn with_sector(mut self, sector: impl Into<String>) -> Self {
        self.sector = Some(sector.into());
        self
    }
}

/// Normalize and validate a ticker symbol: trimmed, upper-cased,
/// 1 to 8 characters of ASCII alphanumerics plus '.' and '-'.
pub fn normalize_ticker(input: &str) -> Result<String, TickerError> {
    let ticker = input.trim().to_ascii_uppercase();
    if ticker.is_empty() {
        return Err(TickerError::Empty);
    }
    if ticker.len() > MAX_TICKER_LEN {
        return Err(TickerError::TooLong(ticker));
    }
    if let Some(c) = ticker
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '.' || *c == '-'))
    {
        return Err(TickerError::InvalidCharacter(c));
    }
    Ok(ticker)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickerError {
    Empty,
    TooLong(String),
    InvalidCharacter(char),
}

impl fmt::Display for TickerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TickerError::Empty => write!(f, "ticker is empty"),
            TickerError::TooLong(t) => {
                write!(f, "ticker '{}' exceeds {} characters", t, MAX_TICKER_LEN)
            }
            TickerError::InvalidCharacter(c) => {
                write!(f, "ticker contains invalid character '{}'", c)
            }
        }
    }
}

impl std::error::Error for TickerError {}
