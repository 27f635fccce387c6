// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use bursa::application::LedgerService;
use bursa::domain::{PriceSource, TradeSide};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use tempfile::TempDir;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = LedgerService::init(db_path.to_str().unwrap()).await?;
    Ok((service, temp_dir))
}

/// Helper to parse a date string into DateTime<Utc>
pub fn parse_date(date_str: &str) -> DateTime<Utc> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc()
}

/// Test fixture: one user holding one stock
pub struct AliceAndAcme;

impl AliceAndAcme {
    /// Create user "alice" and stock "ACME"
    pub async fn create(service: &LedgerService) -> Result<()> {
        service.create_user("alice".into()).await?;
        service
            .upsert_stock("ACME", "Acme Corp".into(), Some("NYSE".into()), None)
            .await?;
        Ok(())
    }

    /// Record a buy for alice at the given date
    pub async fn buy(
        service: &LedgerService,
        quantity: Decimal,
        unit_price: Decimal,
        date: &str,
    ) -> Result<()> {
        service
            .record_transaction(
                "alice",
                "ACME",
                TradeSide::Buy,
                quantity,
                unit_price,
                Decimal::ZERO,
                parse_date(date),
            )
            .await?;
        Ok(())
    }

    /// Record a sell for alice at the given date
    pub async fn sell(
        service: &LedgerService,
        quantity: Decimal,
        unit_price: Decimal,
        date: &str,
    ) -> Result<()> {
        service
            .record_transaction(
                "alice",
                "ACME",
                TradeSide::Sell,
                quantity,
                unit_price,
                Decimal::ZERO,
                parse_date(date),
            )
            .await?;
        Ok(())
    }

    /// Record a manual quote for ACME at the given date
    pub async fn quote(service: &LedgerService, price: Decimal, date: &str) -> Result<()> {
        service
            .record_price("ACME", parse_date(date), price, PriceSource::Manual)
            .await?;
        Ok(())
    }
}
