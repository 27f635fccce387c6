use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{StockId, UserId};

pub type TransactionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "buy" => Some(TradeSide::Buy),
            "sell" => Some(TradeSide::Sell),
            _ => None,
        }
    }
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single buy or sell event. Transactions are immutable once
/// recorded; the ledger is append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    /// Monotonically increasing sequence number, assigned by the
    /// repository. Breaks ties between transactions with the same
    /// timestamp in insertion order.
    pub sequence: i64,
    pub user_id: UserId,
    pub stock_id: StockId,
    pub side: TradeSide,
    /// Number of shares, always positive. Fractional shares are allowed.
    pub quantity: Decimal,
    /// Price paid or received per share.
    pub unit_price: Decimal,
    /// Broker fee for the whole transaction.
    pub fee: Decimal,
    /// When the trade happened in the real world.
    pub timestamp: DateTime<Utc>,
    /// When we recorded the trade in the ledger.
    pub recorded_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a new transaction with zero fee. Sequence number must be
    /// assigned by the repository.
    pub fn new(
        user_id: UserId,
        stock_id: StockId,
        side: TradeSide,
        quantity: Decimal,
        unit_price: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence: 0, // Will be set by repository
            user_id,
            stock_id,
            side,
            quantity,
            unit_price,
            fee: Decimal::ZERO,
            timestamp,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_fee(mut self, fee: Decimal) -> Self {
        self.fee = fee;
        self
    }

    /// Quantity with its sign: positive for buys, negative for sells.
    pub fn signed_quantity(&self) -> Decimal {
        match self.side {
            TradeSide::Buy => self.quantity,
            TradeSide::Sell => -self.quantity,
        }
    }

    /// Total money moved by this transaction, fee included.
    pub fn total_cost(&self) -> Decimal {
        self.quantity * self.unit_price + self.fee
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn test_trade_side_roundtrip() {
        for side in [TradeSide::Buy, TradeSide::Sell] {
            let parsed = TradeSide::from_str(side.as_str()).unwrap();
            assert_eq!(side, parsed);
        }
        assert_eq!(TradeSide::from_str("short"), None);
    }

    #[test]
    fn test_signed_quantity() {
        let user = Uuid::new_v4();
        let stock = Uuid::new_v4();
        let buy = Transaction::new(user, stock, TradeSide::Buy, dec!(10), dec!(5), Utc::now());
        let sell = Transaction::new(user, stock, TradeSide::Sell, dec!(4), dec!(5), Utc::now());

        assert_eq!(buy.signed_quantity(), dec!(10));
        assert_eq!(sell.signed_quantity(), dec!(-4));
    }

    #[test]
    fn test_total_cost_includes_fee() {
        let trade = Transaction::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            TradeSide::Buy,
            dec!(10),
            dec!(5.00),
            Utc::now(),
        )
        .with_fee(dec!(1.50));

        assert_eq!(trade.total_cost(), dec!(51.50));
    }
}
