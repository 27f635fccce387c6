use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::domain::{
    available_to_sell, cash_balance, cost_basis, find_oversold, net_position, normalize_ticker,
    CashDirection, CashTransfer, CostBasisMethod, IntegrityReport, Price, PriceSource, Stock,
    StockId, TradeSide, Transaction, User, UserId,
};
use crate::storage::Repository;

use super::AppError;

/// Application service providing high-level operations for the ledger.
/// This is the primary interface for any client (CLI, market-data
/// fetcher, reporting layer, etc.).
pub struct LedgerService {
    repo: Repository,
}

/// A user's position in one stock, valued at the latest known quote.
pub struct Holding {
    pub stock: Stock,
    pub quantity: Decimal,
    pub cost_basis: Decimal,
    pub last_price: Option<Price>,
    pub market_value: Option<Decimal>,
}

impl LedgerService {
    /// Create a new ledger service with the given repository.
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::new(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::new(repo))
    }

    // ========================
    // User operations
    // ========================

    /// Create a new user.
    pub async fn create_user(&self, name: String) -> Result<User, AppError> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::InvalidUsername(
                "Username must not be empty".to_string(),
            ));
        }

        if self.repo.get_user_by_name(&name).await?.is_some() {
            return Err(AppError::UserAlreadyExists(name));
        }

        let user = User::new(name);
        self.repo.save_user(&user).await?;
        debug!(user = %user.name, id = %user.id, "user created");
        Ok(user)
    }

    /// Get a user by name.
    pub async fn get_user(&self, name: &str) -> Result<User, AppError> {
        self.repo
            .get_user_by_name(name)
            .await?
            .ok_or_else(|| AppError::UserNotFound(name.to_string()))
    }

    /// Get a user by ID.
    pub async fn get_user_by_id(&self, id: UserId) -> Result<User, AppError> {
        self.repo
            .get_user(id)
            .await?
            .ok_or_else(|| AppError::UserNotFound(id.to_string()))
    }

    /// List all users.
    pub async fn list_users(&self) -> Result<Vec<User>, AppError> {
        Ok(self.repo.list_users().await?)
    }

    // ========================
    // Stock operations
    // ========================

    /// Create a stock, or update its metadata if the ticker is already
    /// known. The ticker itself is immutable once set.
    pub async fn upsert_stock(
        &self,
        ticker: &str,
        name: String,
        exchange: Option<String>,
        sector: Option<String>,
    ) -> Result<Stock, AppError> {
        let ticker = normalize_ticker(ticker).map_err(|e| AppError::InvalidTicker(e.to_string()))?;

        match self.repo.get_stock_by_ticker(&ticker).await? {
            Some(mut stock) => {
                stock.name = name;
                stock.exchange = exchange;
                stock.sector = sector;
                self.repo.update_stock_metadata(&stock).await?;
                debug!(ticker = %stock.ticker, "stock metadata updated");
                Ok(stock)
            }
            None => {
                let mut stock = Stock::new(ticker, name);
                stock.exchange = exchange;
                stock.sector = sector;
                self.repo.save_stock(&stock).await?;
                debug!(ticker = %stock.ticker, id = %stock.id, "stock created");
                Ok(stock)
            }
        }
    }

    /// Get a stock by ticker.
    pub async fn get_stock(&self, ticker: &str) -> Result<Stock, AppError> {
        let ticker = normalize_ticker(ticker).map_err(|e| AppError::InvalidTicker(e.to_string()))?;
        self.repo
            .get_stock_by_ticker(&ticker)
            .await?
            .ok_or(AppError::StockNotFound(ticker))
    }

    /// Get a stock by ID.
    pub async fn get_stock_by_id(&self, id: StockId) -> Result<Stock, AppError> {
        self.repo
            .get_stock(id)
            .await?
            .ok_or_else(|| AppError::StockNotFound(id.to_string()))
    }

    /// List all stocks.
    pub async fn list_stocks(&self) -> Result<Vec<Stock>, AppError> {
        Ok(self.repo.list_stocks().await?)
    }

    /// Delete a stock. Rejected if any transaction or price references
    /// it, to preserve historical integrity.
    pub async fn delete_stock(&self, ticker: &str) -> Result<Stock, AppError> {
        let stock = self.get_stock(ticker).await?;
        let (transaction_refs, price_refs) = self.repo.count_stock_refs(stock.id).await?;
        if transaction_refs > 0 || price_refs > 0 {
            return Err(AppError::StockInUse(stock.ticker));
        }
        self.repo.delete_stock(stock.id).await?;
        Ok(stock)
    }

    // ========================
    // Price operations
    // ========================

    /// Record a price quote for a stock. At most one quote may exist
    /// per (stock, timestamp, source); the first record is retained.
    pub async fn record_price(
        &self,
        ticker: &str,
        timestamp: DateTime<Utc>,
        price: Decimal,
        source: PriceSource,
    ) -> Result<Price, AppError> {
        if price < Decimal::ZERO {
            return Err(AppError::InvalidAmount(
                "Price must not be negative".to_string(),
            ));
        }

        let stock = self.get_stock(ticker).await?;

        if self
            .repo
            .get_price(stock.id, timestamp, source)
            .await?
            .is_some()
        {
            return Err(AppError::DuplicatePrice {
                ticker: stock.ticker,
                timestamp,
                price_source: source,
            });
        }

        let quote = Price::new(stock.id, timestamp, price, source);
        self.repo.save_price(&quote).await?;
        debug!(ticker = %stock.ticker, %price, %source, "price recorded");
        Ok(quote)
    }

    /// List a stock's prices in ascending timestamp order, optionally
    /// bounded (both bounds inclusive). Empty when nothing matches.
    pub async fn price_history(
        &self,
        ticker: &str,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<Price>, AppError> {
        let stock = self.get_stock(ticker).await?;
        Ok(self.repo.price_history(stock.id, since, until).await?)
    }

    /// Most recent quote for a stock at or before `as_of` (default:
    /// now). None when no quote exists yet.
    pub async fn latest_price(
        &self,
        ticker: &str,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<Option<Price>, AppError> {
        let stock = self.get_stock(ticker).await?;
        let as_of = as_of.unwrap_or_else(Utc::now);
        Ok(self.repo.latest_price(stock.id, as_of).await?)
    }

    // ========================
    // Transaction operations
    // ========================

    /// Record a buy or sell. Sells are validated against the user's
    /// replayed position: the transaction is rejected if it would drive
    /// the held quantity negative at any point of the timeline. A
    /// rejected transaction leaves the ledger unchanged.
    pub async fn record_transaction(
        &self,
        username: &str,
        ticker: &str,
        side: TradeSide,
        quantity: Decimal,
        unit_price: Decimal,
        fee: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Result<Transaction, AppError> {
        if quantity <= Decimal::ZERO {
            return Err(AppError::InvalidAmount(
                "Quantity must be positive".to_string(),
            ));
        }
        if unit_price < Decimal::ZERO {
            return Err(AppError::InvalidAmount(
                "Unit price must not be negative".to_string(),
            ));
        }
        if fee < Decimal::ZERO {
            return Err(AppError::InvalidAmount(
                "Fee must not be negative".to_string(),
            ));
        }

        let user = self.get_user(username).await?;
        let stock = self.get_stock(ticker).await?;

        if side == TradeSide::Sell {
            let history = self
                .repo
                .list_transactions_for_position(user.id, stock.id, None)
                .await?;
            let available = available_to_sell(&history, timestamp);
            if quantity > available {
                return Err(AppError::InsufficientPosition {
                    ticker: stock.ticker,
                    available,
                    requested: quantity,
                });
            }
        }

        let mut transaction =
            Transaction::new(user.id, stock.id, side, quantity, unit_price, timestamp).with_fee(fee);
        self.repo.save_transaction(&mut transaction).await?;

        debug!(
            user = %user.name,
            ticker = %stock.ticker,
            %side,
            %quantity,
            %unit_price,
            sequence = transaction.sequence,
            "transaction recorded"
        );
        Ok(transaction)
    }

    /// List a user's transactions, optionally restricted to one stock,
    /// ordered by timestamp then sequence.
    pub async fn list_transactions(
        &self,
        username: &str,
        ticker: Option<&str>,
    ) -> Result<Vec<Transaction>, AppError> {
        let user = self.get_user(username).await?;
        match ticker {
            Some(ticker) => {
                let stock = self.get_stock(ticker).await?;
                Ok(self
                    .repo
                    .list_transactions_for_position(user.id, stock.id, None)
                    .await?)
            }
            None => Ok(self.repo.list_transactions_for_user(user.id).await?),
        }
    }

    /// List every transaction in the ledger.
    pub async fn list_all_transactions(&self) -> Result<Vec<Transaction>, AppError> {
        Ok(self.repo.list_transactions().await?)
    }

    // ========================
    // Position & cost basis
    // ========================

    /// Net held quantity for a (user, stock) pair as of the given
    /// instant (default: now). Zero when no transactions exist.
    pub async fn get_position(
        &self,
        username: &str,
        ticker: &str,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<Decimal, AppError> {
        let user = self.get_user(username).await?;
        let stock = self.get_stock(ticker).await?;
        let as_of = as_of.unwrap_or_else(Utc::now);

        let transactions = self
            .repo
            .list_transactions_for_position(user.id, stock.id, Some(as_of))
            .await?;
        Ok(net_position(&transactions))
    }

    /// Cost of the still-held portion of a position as of the given
    /// instant, using FIFO matching.
    pub async fn get_cost_basis(
        &self,
        username: &str,
        ticker: &str,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<Decimal, AppError> {
        self.get_cost_basis_with(username, ticker, as_of, CostBasisMethod::Fifo)
            .await
    }

    /// Cost basis with an explicit matching method.
    pub async fn get_cost_basis_with(
        &self,
        username: &str,
        ticker: &str,
        as_of: Option<DateTime<Utc>>,
        method: CostBasisMethod,
    ) -> Result<Decimal, AppError> {
        let user = self.get_user(username).await?;
        let stock = self.get_stock(ticker).await?;
        let as_of = as_of.unwrap_or_else(Utc::now);

        let transactions = self
            .repo
            .list_transactions_for_position(user.id, stock.id, Some(as_of))
            .await?;
        Ok(cost_basis(&transactions, method))
    }

    /// A user's current holdings across all stocks, each valued at the
    /// latest known quote. Stocks whose position has gone back to zero
    /// are omitted.
    pub async fn portfolio(&self, username: &str) -> Result<Vec<Holding>, AppError> {
        let user = self.get_user(username).await?;
        let transactions = self.repo.list_transactions_for_user(user.id).await?;
        let now = Utc::now();

        let mut stock_ids: Vec<StockId> = Vec::new();
        for t in &transactions {
            if !stock_ids.contains(&t.stock_id) {
                stock_ids.push(t.stock_id);
            }
        }

        let mut holdings = Vec::new();
        for stock_id in stock_ids {
            let history: Vec<Transaction> = transactions
                .iter()
                .filter(|t| t.stock_id == stock_id)
                .cloned()
                .collect();

            let quantity = net_position(&history);
            if quantity.is_zero() {
                continue;
            }

            let stock = self.get_stock_by_id(stock_id).await?;
            let last_price = self.repo.latest_price(stock_id, now).await?;
            let market_value = last_price.as_ref().map(|p| quantity * p.price);

            holdings.push(Holding {
                stock,
                quantity,
                cost_basis: cost_basis(&history, CostBasisMethod::Fifo),
                last_price,
                market_value,
            });
        }

        Ok(holdings)
    }

    // ========================
    // Cash operations
    // ========================

    /// Deposit cash into a user's account.
    pub async fn deposit(
        &self,
        username: &str,
        amount: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Result<CashTransfer, AppError> {
        self.record_cash_transfer(username, CashDirection::Deposit, amount, timestamp)
            .await
    }

    /// Withdraw cash from a user's account. Rejected if it would
    /// overdraw the cash balance.
    pub async fn withdraw(
        &self,
        username: &str,
        amount: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Result<CashTransfer, AppError> {
        self.record_cash_transfer(username, CashDirection::Withdrawal, amount, timestamp)
            .await
    }

    /// A user's net cash balance from deposits and withdrawals.
    pub async fn cash_balance(&self, username: &str) -> Result<Decimal, AppError> {
        let user = self.get_user(username).await?;
        let transfers = self.repo.list_cash_transfers(user.id).await?;
        Ok(cash_balance(&transfers))
    }

    async fn record_cash_transfer(
        &self,
        username: &str,
        direction: CashDirection,
        amount: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Result<CashTransfer, AppError> {
        if amount <= Decimal::ZERO {
            return Err(AppError::InvalidAmount(
                "Amount must be positive".to_string(),
            ));
        }

        let user = self.get_user(username).await?;

        if direction == CashDirection::Withdrawal {
            let transfers = self.repo.list_cash_transfers(user.id).await?;
            let balance = cash_balance(&transfers);
            if balance < amount {
                return Err(AppError::InsufficientFunds {
                    username: user.name,
                    balance,
                    required: amount,
                });
            }
        }

        let transfer = CashTransfer::new(user.id, direction, amount, timestamp);
        self.repo.save_cash_transfer(&transfer).await?;
        debug!(user = %username, %direction, %amount, "cash transfer recorded");
        Ok(transfer)
    }

    /// List a user's cash transfers.
    pub async fn list_cash_transfers(&self, username: &str) -> Result<Vec<CashTransfer>, AppError> {
        let user = self.get_user(username).await?;
        Ok(self.repo.list_cash_transfers(user.id).await?)
    }

    // ========================
    // Integrity operations
    // ========================

    /// Check ledger integrity and return a report.
    pub async fn check_integrity(&self) -> Result<IntegrityReport, AppError> {
        let stats = self.repo.get_integrity_stats().await?;
        let transactions = self.repo.list_transactions().await?;

        let invalid_quantities = transactions
            .iter()
            .filter(|t| {
                t.quantity <= Decimal::ZERO
                    || t.unit_price < Decimal::ZERO
                    || t.fee < Decimal::ZERO
            })
            .count();

        let report = IntegrityReport {
            user_count: stats.user_count,
            stock_count: stats.stock_count,
            price_count: stats.price_count,
            transaction_count: stats.transaction_count,
            has_sequence_gaps: stats.has_sequence_gaps,
            invalid_user_refs: stats.invalid_user_refs,
            invalid_stock_refs: stats.invalid_stock_refs,
            invalid_quantities,
            oversold_pairs: find_oversold(&transactions),
        };

        if !report.is_ok() {
            warn!(
                sequence_gaps = report.has_sequence_gaps,
                invalid_user_refs = report.invalid_user_refs,
                invalid_stock_refs = report.invalid_stock_refs,
                invalid_quantities = report.invalid_quantities,
                oversold = report.oversold_pairs.len(),
                "ledger integrity violations found"
            );
        }

        Ok(report)
    }
}
