use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UserId;

pub type CashTransferId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CashDirection {
    Deposit,
    Withdrawal,
}

impl CashDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            CashDirection::Deposit => "deposit",
            CashDirection::Withdrawal => "withdrawal",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "deposit" => Some(CashDirection::Deposit),
            "withdrawal" => Some(CashDirection::Withdrawal),
            _ => None,
        }
    }
}

impl std::fmt::Display for CashDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Money moved into or out of a user's cash account. The cash ledger
/// is kept separate from the trade ledger: trades never debit it, so
/// historical trade imports work without reconstructing funding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashTransfer {
    pub id: CashTransferId,
    pub user_id: UserId,
    pub direction: CashDirection,
    /// Amount moved, always positive.
    pub amount: Decimal,
    pub timestamp: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
}

impl CashTransfer {
    pub fn new(
        user_id: UserId,
        direction: CashDirection,
        amount: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            direction,
            amount,
            timestamp,
            recorded_at: Utc::now(),
        }
    }

    /// Amount with its sign: positive for deposits, negative for
    /// withdrawals.
    pub fn signed_amount(&self) -> Decimal {
        match self.direction {
            CashDirection::Deposit => self.amount,
            CashDirection::Withdrawal => -self.amount,
        }
    }
}
