use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::application::LedgerService;
use crate::domain::{format_amount, CashTransfer, Price, Stock, Transaction, User};

/// Database snapshot for full export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub users: Vec<User>,
    pub stocks: Vec<Stock>,
    pub prices: Vec<Price>,
    pub transactions: Vec<Transaction>,
    pub cash_transfers: Vec<CashTransfer>,
}

/// Exporter for converting ledger data to various formats
pub struct Exporter<'a> {
    service: &'a LedgerService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a LedgerService) -> Self {
        Self { service }
    }

    /// Export all transactions to CSV format
    pub async fn export_transactions_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let transactions = self.service.list_all_transactions().await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        // Write header
        csv_writer.write_record([
            "id",
            "sequence",
            "timestamp",
            "user",
            "ticker",
            "side",
            "quantity",
            "unit_price",
            "fee",
        ])?;

        let mut count = 0;
        for transaction in &transactions {
            let user = self.service.get_user_by_id(transaction.user_id).await?;
            let stock = self.service.get_stock_by_id(transaction.stock_id).await?;

            csv_writer.write_record([
                transaction.id.to_string(),
                transaction.sequence.to_string(),
                transaction.timestamp.to_rfc3339(),
                user.name,
                stock.ticker,
                transaction.side.to_string(),
                transaction.quantity.to_string(),
                format_amount(transaction.unit_price),
                format_amount(transaction.fee),
            ])?;
            count += 1;
        }

        csv_writer.flush()?;
        Ok(count)
    }

    /// Export a stock's price history to CSV format
    pub async fn export_prices_csv<W: Write>(&self, ticker: &str, writer: W) -> Result<usize> {
        let stock = self.service.get_stock(ticker).await?;
        let prices = self.service.price_history(ticker, None, None).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        // Write header
        csv_writer.write_record(["ticker", "timestamp", "price", "source"])?;

        let mut count = 0;
        for price in &prices {
            csv_writer.write_record([
                stock.ticker.clone(),
                price.timestamp.to_rfc3339(),
                format_amount(price.price),
                price.source.to_string(),
            ])?;
            count += 1;
        }

        csv_writer.flush()?;
        Ok(count)
    }

    /// Export a user's holdings to CSV format
    pub async fn export_holdings_csv<W: Write>(&self, username: &str, writer: W) -> Result<usize> {
        let holdings = self.service.portfolio(username).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        // Write header
        csv_writer.write_record(["ticker", "quantity", "cost_basis", "last_price", "market_value"])?;

        let mut count = 0;
        for holding in &holdings {
            csv_writer.write_record([
                holding.stock.ticker.clone(),
                holding.quantity.to_string(),
                format_amount(holding.cost_basis),
                holding
                    .last_price
                    .as_ref()
                    .map(|p| format_amount(p.price))
                    .unwrap_or_default(),
                holding.market_value.map(format_amount).unwrap_or_default(),
            ])?;
            count += 1;
        }

        csv_writer.flush()?;
        Ok(count)
    }

    /// Export the full ledger as a JSON snapshot
    pub async fn export_full_json<W: Write>(&self, mut writer: W) -> Result<LedgerSnapshot> {
        let users = self.service.list_users().await?;
        let stocks = self.service.list_stocks().await?;
        let transactions = self.service.list_all_transactions().await?;

        let mut prices = Vec::new();
        for stock in &stocks {
            prices.extend(self.service.price_history(&stock.ticker, None, None).await?);
        }

        let mut cash_transfers = Vec::new();
        for user in &users {
            cash_transfers.extend(self.service.list_cash_transfers(&user.name).await?);
        }

        let snapshot = LedgerSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            users,
            stocks,
            prices,
            transactions,
            cash_transfers,
        };

        let json = serde_json::to_string_pretty(&snapshot)?;
        writer.write_all(json.as_bytes())?;
        writer.flush()?;

        Ok(snapshot)
    }
}
