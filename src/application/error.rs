use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::PriceSource;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("User already exists: {0}")]
    UserAlreadyExists(String),

    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    #[error("Stock not found: {0}")]
    StockNotFound(String),

    #[error("Invalid ticker: {0}")]
    InvalidTicker(String),

    #[error("Stock {0} is referenced by transactions or prices and cannot be deleted")]
    StockInUse(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Price already recorded for {ticker} at {timestamp} from source '{price_source}'")]
    DuplicatePrice {
        ticker: String,
        timestamp: DateTime<Utc>,
        price_source: PriceSource,
    },

    #[error("Insufficient position in {ticker}: {requested} to be sold, but only {available} available")]
    InsufficientPosition {
        ticker: String,
        available: Decimal,
        requested: Decimal,
    },

    #[error("Insufficient funds for {username}: balance {balance}, required {required}")]
    InsufficientFunds {
        username: String,
        balance: Decimal,
        required: Decimal,
    },

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}
