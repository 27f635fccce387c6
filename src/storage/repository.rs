use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::{
    CashDirection, CashTransfer, Price, PriceSource, Stock, StockId, TradeSide, Transaction, User,
    UserId,
};

use super::{MIGRATION_001_INITIAL, MIGRATION_002_CASH_TRANSFERS};

/// Statistics for ledger integrity verification.
#[derive(Debug, Clone)]
pub struct IntegrityStats {
    pub user_count: i64,
    pub stock_count: i64,
    pub price_count: i64,
    pub transaction_count: i64,
    pub has_sequence_gaps: bool,
    pub invalid_user_refs: i64,
    pub invalid_stock_refs: i64,
}

/// Repository for persisting and querying users, stocks, prices and
/// transactions.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given path.
    /// Creates the database file if it doesn't exist.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;

        sqlx::query(MIGRATION_002_CASH_TRANSFERS)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 002")?;

        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    // ========================
    // User operations
    // ========================

    /// Save a new user to the database.
    pub async fn save_user(&self, user: &User) -> Result<()> {
        sqlx::query("INSERT INTO users (id, name, created_at) VALUES (?, ?, ?)")
            .bind(user.id.to_string())
            .bind(&user.name)
            .bind(user.created_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .context("Failed to save user")?;
        Ok(())
    }

    /// Get a user by ID.
    pub async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, name, created_at FROM users WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_user(&row)?)),
            None => Ok(None),
        }
    }

    /// Get a user by name.
    pub async fn get_user_by_name(&self, name: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, name, created_at FROM users WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user by name")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_user(&row)?)),
            None => Ok(None),
        }
    }

    /// List all users.
    pub async fn list_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query("SELECT id, name, created_at FROM users ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list users")?;

        rows.iter().map(Self::row_to_user).collect()
    }

    fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
        let id_str: String = row.get("id");
        let created_at_str: String = row.get("created_at");

        Ok(User {
            id: Uuid::parse_str(&id_str).context("Invalid user ID")?,
            name: row.get("name"),
            created_at: DateTime::parse_from_rfc3339(&created_at_str)
                .context("Invalid created_at timestamp")?
                .with_timezone(&Utc),
        })
    }

    // ========================
    // Stock operations
    // ========================

    /// Save a new stock to the database.
    pub async fn save_stock(&self, stock: &Stock) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO stocks (id, ticker, name, exchange, sector, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(stock.id.to_string())
        .bind(&stock.ticker)
        .bind(&stock.name)
        .bind(&stock.exchange)
        .bind(&stock.sector)
        .bind(stock.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to save stock")?;
        Ok(())
    }

    /// Update a stock's mutable metadata. The ticker is immutable.
    pub async fn update_stock_metadata(&self, stock: &Stock) -> Result<()> {
        sqlx::query("UPDATE stocks SET name = ?, exchange = ?, sector = ? WHERE id = ?")
            .bind(&stock.name)
            .bind(&stock.exchange)
            .bind(&stock.sector)
            .bind(stock.id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to update stock")?;
        Ok(())
    }

    /// Get a stock by ID.
    pub async fn get_stock(&self, id: StockId) -> Result<Option<Stock>> {
        let row = sqlx::query(
            "SELECT id, ticker, name, exchange, sector, created_at FROM stocks WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch stock")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_stock(&row)?)),
            None => Ok(None),
        }
    }

    /// Get a stock by ticker.
    pub async fn get_stock_by_ticker(&self, ticker: &str) -> Result<Option<Stock>> {
        let row = sqlx::query(
            "SELECT id, ticker, name, exchange, sector, created_at FROM stocks WHERE ticker = ?",
        )
        .bind(ticker)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch stock by ticker")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_stock(&row)?)),
            None => Ok(None),
        }
    }

    /// List all stocks.
    pub async fn list_stocks(&self) -> Result<Vec<Stock>> {
        let rows = sqlx::query(
            "SELECT id, ticker, name, exchange, sector, created_at FROM stocks ORDER BY ticker",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list stocks")?;

        rows.iter().map(Self::row_to_stock).collect()
    }

    /// Count references to a stock from transactions and prices.
    /// A stock with references must not be deleted.
    pub async fn count_stock_refs(&self, id: StockId) -> Result<(i64, i64)> {
        let id_str = id.to_string();

        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM transactions WHERE stock_id = ?) as transaction_refs,
                (SELECT COUNT(*) FROM prices WHERE stock_id = ?) as price_refs
            "#,
        )
        .bind(&id_str)
        .bind(&id_str)
        .fetch_one(&self.pool)
        .await
        .context("Failed to count stock references")?;

        Ok((row.get("transaction_refs"), row.get("price_refs")))
    }

    /// Delete a stock. Callers must check references first.
    pub async fn delete_stock(&self, id: StockId) -> Result<()> {
        sqlx::query("DELETE FROM stocks WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to delete stock")?;
        Ok(())
    }

    fn row_to_stock(row: &sqlx::sqlite::SqliteRow) -> Result<Stock> {
        let id_str: String = row.get("id");
        let created_at_str: String = row.get("created_at");

        Ok(Stock {
            id: Uuid::parse_str(&id_str).context("Invalid stock ID")?,
            ticker: row.get("ticker"),
            name: row.get("name"),
            exchange: row.get("exchange"),
            sector: row.get("sector"),
            created_at: DateTime::parse_from_rfc3339(&created_at_str)
                .context("Invalid created_at timestamp")?
                .with_timezone(&Utc),
        })
    }

    // ========================
    // Price operations
    // ========================

    /// Save a new price quote to the database.
    pub async fn save_price(&self, price: &Price) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO prices (stock_id, timestamp, price, source)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(price.stock_id.to_string())
        .bind(price.timestamp.to_rfc3339())
        .bind(price.price.to_string())
        .bind(price.source.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to save price")?;
        Ok(())
    }

    /// Get the price for an exact (stock, timestamp, source) tuple.
    pub async fn get_price(
        &self,
        stock_id: StockId,
        timestamp: DateTime<Utc>,
        source: PriceSource,
    ) -> Result<Option<Price>> {
        let row = sqlx::query(
            r#"
            SELECT stock_id, timestamp, price, source
            FROM prices
            WHERE stock_id = ? AND timestamp = ? AND source = ?
            "#,
        )
        .bind(stock_id.to_string())
        .bind(timestamp.to_rfc3339())
        .bind(source.as_str())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch price")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_price(&row)?)),
            None => Ok(None),
        }
    }

    /// List prices for a stock in ascending timestamp order, with
    /// optional range bounds (both inclusive).
    pub async fn price_history(
        &self,
        stock_id: StockId,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<Price>> {
        let mut query =
            String::from("SELECT stock_id, timestamp, price, source FROM prices WHERE stock_id = ?");

        let since_str = since.map(|dt| dt.to_rfc3339());
        let until_str = until.map(|dt| dt.to_rfc3339());

        if since.is_some() {
            query.push_str(" AND timestamp >= ?");
        }
        if until.is_some() {
            query.push_str(" AND timestamp <= ?");
        }
        query.push_str(" ORDER BY timestamp");

        let mut sql_query = sqlx::query(&query).bind(stock_id.to_string());
        if let Some(ref s) = since_str {
            sql_query = sql_query.bind(s);
        }
        if let Some(ref u) = until_str {
            sql_query = sql_query.bind(u);
        }

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch price history")?;

        rows.iter().map(Self::row_to_price).collect()
    }

    /// Most recent price for a stock at or before the given instant.
    pub async fn latest_price(
        &self,
        stock_id: StockId,
        as_of: DateTime<Utc>,
    ) -> Result<Option<Price>> {
        let row = sqlx::query(
            r#"
            SELECT stock_id, timestamp, price, source
            FROM prices
            WHERE stock_id = ? AND timestamp <= ?
            ORDER BY timestamp DESC
            LIMIT 1
            "#,
        )
        .bind(stock_id.to_string())
        .bind(as_of.to_rfc3339())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch latest price")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_price(&row)?)),
            None => Ok(None),
        }
    }

    fn row_to_price(row: &sqlx::sqlite::SqliteRow) -> Result<Price> {
        let stock_id_str: String = row.get("stock_id");
        let timestamp_str: String = row.get("timestamp");
        let price_str: String = row.get("price");
        let source_str: String = row.get("source");

        Ok(Price {
            stock_id: Uuid::parse_str(&stock_id_str).context("Invalid stock ID")?,
            timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                .context("Invalid price timestamp")?
                .with_timezone(&Utc),
            price: Self::parse_decimal(&price_str, "price")?,
            source: PriceSource::from_str(&source_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid price source: {}", source_str))?,
        })
    }

    // ========================
    // Transaction operations
    // ========================

    /// Save a new transaction to the database.
    /// Assigns the next sequence number; the counter update and the
    /// insert commit together or not at all.
    pub async fn save_transaction(&self, transaction: &mut Transaction) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let row = sqlx::query(
            r#"
            UPDATE sequence_counter
            SET value = value + 1
            WHERE name = 'transaction_sequence'
            RETURNING value
            "#,
        )
        .fetch_one(&mut *tx)
        .await
        .context("Failed to get next sequence number")?;
        transaction.sequence = row.get("value");

        sqlx::query(
            r#"
            INSERT INTO transactions (id, sequence, user_id, stock_id, side, quantity, unit_price, fee, timestamp, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(transaction.id.to_string())
        .bind(transaction.sequence)
        .bind(transaction.user_id.to_string())
        .bind(transaction.stock_id.to_string())
        .bind(transaction.side.as_str())
        .bind(transaction.quantity.to_string())
        .bind(transaction.unit_price.to_string())
        .bind(transaction.fee.to_string())
        .bind(transaction.timestamp.to_rfc3339())
        .bind(transaction.recorded_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .context("Failed to save transaction")?;

        tx.commit().await.context("Failed to commit transaction")?;
        Ok(())
    }

    /// List a user's transactions in one stock, ordered by timestamp
    /// then sequence, optionally bounded by an inclusive upper
    /// timestamp.
    pub async fn list_transactions_for_position(
        &self,
        user_id: UserId,
        stock_id: StockId,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<Transaction>> {
        let mut query = String::from(
            "SELECT id, sequence, user_id, stock_id, side, quantity, unit_price, fee, timestamp, recorded_at FROM transactions WHERE user_id = ? AND stock_id = ?"
        );

        let until_str = until.map(|dt| dt.to_rfc3339());
        if until.is_some() {
            query.push_str(" AND timestamp <= ?");
        }
        query.push_str(" ORDER BY timestamp, sequence");

        let mut sql_query = sqlx::query(&query)
            .bind(user_id.to_string())
            .bind(stock_id.to_string());
        if let Some(ref u) = until_str {
            sql_query = sql_query.bind(u);
        }

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list transactions for position")?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    /// List all transactions for a user, ordered by timestamp then
    /// sequence.
    pub async fn list_transactions_for_user(&self, user_id: UserId) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, sequence, user_id, stock_id, side, quantity, unit_price, fee, timestamp, recorded_at
            FROM transactions
            WHERE user_id = ?
            ORDER BY timestamp, sequence
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list transactions for user")?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    /// List every transaction in the ledger, ordered by timestamp then
    /// sequence.
    pub async fn list_transactions(&self) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, sequence, user_id, stock_id, side, quantity, unit_price, fee, timestamp, recorded_at
            FROM transactions
            ORDER BY timestamp, sequence
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list transactions")?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    fn row_to_transaction(row: &sqlx::sqlite::SqliteRow) -> Result<Transaction> {
        let id_str: String = row.get("id");
        let user_id_str: String = row.get("user_id");
        let stock_id_str: String = row.get("stock_id");
        let side_str: String = row.get("side");
        let quantity_str: String = row.get("quantity");
        let unit_price_str: String = row.get("unit_price");
        let fee_str: String = row.get("fee");
        let timestamp_str: String = row.get("timestamp");
        let recorded_at_str: String = row.get("recorded_at");

        Ok(Transaction {
            id: Uuid::parse_str(&id_str).context("Invalid transaction ID")?,
            sequence: row.get("sequence"),
            user_id: Uuid::parse_str(&user_id_str).context("Invalid user ID")?,
            stock_id: Uuid::parse_str(&stock_id_str).context("Invalid stock ID")?,
            side: TradeSide::from_str(&side_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid trade side: {}", side_str))?,
            quantity: Self::parse_decimal(&quantity_str, "quantity")?,
            unit_price: Self::parse_decimal(&unit_price_str, "unit_price")?,
            fee: Self::parse_decimal(&fee_str, "fee")?,
            timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                .context("Invalid timestamp")?
                .with_timezone(&Utc),
            recorded_at: DateTime::parse_from_rfc3339(&recorded_at_str)
                .context("Invalid recorded_at")?
                .with_timezone(&Utc),
        })
    }

    // ========================
    // Cash transfer operations
    // ========================

    /// Save a new cash transfer to the database.
    pub async fn save_cash_transfer(&self, transfer: &CashTransfer) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cash_transfers (id, user_id, direction, amount, timestamp, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(transfer.id.to_string())
        .bind(transfer.user_id.to_string())
        .bind(transfer.direction.as_str())
        .bind(transfer.amount.to_string())
        .bind(transfer.timestamp.to_rfc3339())
        .bind(transfer.recorded_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to save cash transfer")?;
        Ok(())
    }

    /// List a user's cash transfers, ordered by timestamp then
    /// recording time.
    pub async fn list_cash_transfers(&self, user_id: UserId) -> Result<Vec<CashTransfer>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, direction, amount, timestamp, recorded_at
            FROM cash_transfers
            WHERE user_id = ?
            ORDER BY timestamp, recorded_at
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list cash transfers")?;

        rows.iter().map(Self::row_to_cash_transfer).collect()
    }

    fn row_to_cash_transfer(row: &sqlx::sqlite::SqliteRow) -> Result<CashTransfer> {
        let id_str: String = row.get("id");
        let user_id_str: String = row.get("user_id");
        let direction_str: String = row.get("direction");
        let amount_str: String = row.get("amount");
        let timestamp_str: String = row.get("timestamp");
        let recorded_at_str: String = row.get("recorded_at");

        Ok(CashTransfer {
            id: Uuid::parse_str(&id_str).context("Invalid cash transfer ID")?,
            user_id: Uuid::parse_str(&user_id_str).context("Invalid user ID")?,
            direction: CashDirection::from_str(&direction_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid cash direction: {}", direction_str))?,
            amount: Self::parse_decimal(&amount_str, "amount")?,
            timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                .context("Invalid timestamp")?
                .with_timezone(&Utc),
            recorded_at: DateTime::parse_from_rfc3339(&recorded_at_str)
                .context("Invalid recorded_at")?
                .with_timezone(&Utc),
        })
    }

    // ========================
    // Integrity operations
    // ========================

    /// Get statistics for integrity checking.
    pub async fn get_integrity_stats(&self) -> Result<IntegrityStats> {
        let user_count: i64 = sqlx::query("SELECT COUNT(*) as count FROM users")
            .fetch_one(&self.pool)
            .await?
            .get("count");

        let stock_count: i64 = sqlx::query("SELECT COUNT(*) as count FROM stocks")
            .fetch_one(&self.pool)
            .await?
            .get("count");

        let price_count: i64 = sqlx::query("SELECT COUNT(*) as count FROM prices")
            .fetch_one(&self.pool)
            .await?
            .get("count");

        // Check for sequence gaps
        let sequence_check = sqlx::query(
            r#"
            SELECT
                MIN(sequence) as min_seq,
                MAX(sequence) as max_seq,
                COUNT(*) as count
            FROM transactions
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let min_seq: Option<i64> = sequence_check.get("min_seq");
        let max_seq: Option<i64> = sequence_check.get("max_seq");
        let transaction_count: i64 = sequence_check.get("count");

        let has_sequence_gaps = match (min_seq, max_seq) {
            (Some(min), Some(max)) => (max - min + 1) != transaction_count,
            _ => false,
        };

        // Check for dangling user references
        let invalid_user_refs: i64 = sqlx::query(
            r#"
            SELECT COUNT(*) as count
            FROM transactions t
            WHERE NOT EXISTS (SELECT 1 FROM users u WHERE u.id = t.user_id)
            "#,
        )
        .fetch_one(&self.pool)
        .await?
        .get("count");

        // Check for dangling stock references from transactions and prices
        let invalid_stock_refs: i64 = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM transactions t
                 WHERE NOT EXISTS (SELECT 1 FROM stocks s WHERE s.id = t.stock_id)) +
                (SELECT COUNT(*) FROM prices p
                 WHERE NOT EXISTS (SELECT 1 FROM stocks s WHERE s.id = p.stock_id)) as count
            "#,
        )
        .fetch_one(&self.pool)
        .await?
        .get("count");

        Ok(IntegrityStats {
            user_count,
            stock_count,
            price_count,
            transaction_count,
            has_sequence_gaps,
            invalid_user_refs,
            invalid_stock_refs,
        })
    }

    fn parse_decimal(value: &str, column: &str) -> Result<Decimal> {
        Decimal::from_str(value).with_context(|| format!("Invalid decimal in column {}", column))
    }
}
