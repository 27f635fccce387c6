use std::io::Read;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};

use crate::application::{AppError, LedgerService};
use crate::domain::{parse_amount, TradeSide};

/// Result of an import operation
#[derive(Debug, Clone)]
pub struct ImportResult {
    pub imported: usize,
    pub skipped: usize,
    pub errors: Vec<ImportError>,
}

/// Error that occurred during import
#[derive(Debug, Clone)]
pub struct ImportError {
    pub line: usize,
    pub field: Option<String>,
    pub error: String,
}

/// Options for import operations
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub dry_run: bool,
    pub create_missing_stocks: bool,
}

/// Importer for loading broker trade histories into the ledger.
///
/// Expected CSV columns: user, ticker, side, quantity, unit_price,
/// fee, timestamp. A bad row is collected as an error; the rest of
/// the file is still processed.
pub struct Importer<'a> {
    service: &'a LedgerService,
}

impl<'a> Importer<'a> {
    pub fn new(service: &'a LedgerService) -> Self {
        Self { service }
    }

    /// Import trades from CSV
    pub async fn import_trades_csv<R: Read>(
        &self,
        reader: R,
        options: ImportOptions,
    ) -> Result<ImportResult> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let mut imported = 0;
        let mut skipped = 0;
        let mut errors = Vec::new();

        for (line_num, result) in csv_reader.records().enumerate() {
            let line = line_num + 2; // +2 for header and 0-indexing

            let record = match result {
                Ok(r) => r,
                Err(e) => {
                    errors.push(ImportError {
                        line,
                        field: None,
                        error: format!("CSV parse error: {}", e),
                    });
                    continue;
                }
            };

            let username = record.get(0).unwrap_or("");
            let ticker = record.get(1).unwrap_or("");
            let side_str = record.get(2).unwrap_or("");
            let quantity_str = record.get(3).unwrap_or("");
            let unit_price_str = record.get(4).unwrap_or("");
            let fee_str = record.get(5).unwrap_or("");
            let timestamp_str = record.get(6).unwrap_or("");

            let Some(side) = TradeSide::from_str(side_str) else {
                errors.push(ImportError {
                    line,
                    field: Some("side".to_string()),
                    error: format!("Invalid trade side: {}", side_str),
                });
                continue;
            };

            let quantity = match parse_amount(quantity_str) {
                Ok(q) => q,
                Err(e) => {
                    errors.push(ImportError {
                        line,
                        field: Some("quantity".to_string()),
                        error: format!("Invalid quantity: {}", e),
                    });
                    continue;
                }
            };

            let unit_price = match parse_amount(unit_price_str) {
                Ok(p) => p,
                Err(e) => {
                    errors.push(ImportError {
                        line,
                        field: Some("unit_price".to_string()),
                        error: format!("Invalid unit price: {}", e),
                    });
                    continue;
                }
            };

            let fee = if fee_str.is_empty() {
                rust_decimal::Decimal::ZERO
            } else {
                match parse_amount(fee_str) {
                    Ok(f) => f,
                    Err(e) => {
                        errors.push(ImportError {
                            line,
                            field: Some("fee".to_string()),
                            error: format!("Invalid fee: {}", e),
                        });
                        continue;
                    }
                }
            };

            let timestamp = match parse_timestamp(timestamp_str) {
                Ok(ts) => ts,
                Err(e) => {
                    errors.push(ImportError {
                        line,
                        field: Some("timestamp".to_string()),
                        error: format!("Invalid timestamp: {}", e),
                    });
                    continue;
                }
            };

            if options.create_missing_stocks {
                if let Err(e) = self.ensure_stock_exists(ticker).await {
                    errors.push(ImportError {
                        line,
                        field: Some("ticker".to_string()),
                        error: format!("Stock error: {}", e),
                    });
                    continue;
                }
            }

            // Skip the actual write on a dry run
            if options.dry_run {
                imported += 1;
                continue;
            }

            match self
                .service
                .record_transaction(username, ticker, side, quantity, unit_price, fee, timestamp)
                .await
            {
                Ok(_) => {
                    imported += 1;
                }
                Err(AppError::InsufficientPosition { .. }) => {
                    skipped += 1;
                }
                Err(e) => {
                    errors.push(ImportError {
                        line,
                        field: None,
                        error: format!("Transaction failed: {}", e),
                    });
                }
            }
        }

        Ok(ImportResult {
            imported,
            skipped,
            errors,
        })
    }

    // Create a placeholder stock named after its ticker
    async fn ensure_stock_exists(&self, ticker: &str) -> Result<(), AppError> {
        if self.service.get_stock(ticker).await.is_ok() {
            return Ok(());
        }
        self.service
            .upsert_stock(ticker, ticker.to_uppercase(), None, None)
            .await?;
        Ok(())
    }
}

// Helper function to parse timestamp
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    // Try RFC3339 first
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Try YYYY-MM-DD format
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date.and_hms_opt(0, 0, 0).unwrap().and_utc());
    }

    anyhow::bail!("Invalid timestamp format: {}", s)
}
