use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{CashTransfer, StockId, TradeSide, Transaction, UserId};

/// Net held quantity as of the given instant, computed as the signed
/// sum of quantities over transactions with timestamp <= as_of.
/// Transactions must be sorted by (timestamp, sequence).
pub fn position_at(transactions: &[Transaction], as_of: DateTime<Utc>) -> Decimal {
    transactions
        .iter()
        .filter(|t| t.timestamp <= as_of)
        .map(Transaction::signed_quantity)
        .sum()
}

/// Net held quantity over the whole history.
pub fn net_position(transactions: &[Transaction]) -> Decimal {
    transactions.iter().map(Transaction::signed_quantity).sum()
}

/// Largest quantity that can be sold at `as_of` without driving the
/// running position negative at any point of the timeline.
///
/// A sell inserted at `as_of` reduces every running position from that
/// spot onward, so the bound is the minimum of the position at `as_of`
/// and the position after each later transaction. This also catches
/// backdated sells that would invalidate history already recorded.
/// Transactions must be sorted by (timestamp, sequence).
pub fn available_to_sell(transactions: &[Transaction], as_of: DateTime<Utc>) -> Decimal {
    let mut running = Decimal::ZERO;
    let mut available = Decimal::ZERO;

    for t in transactions {
        running += t.signed_quantity();
        if t.timestamp <= as_of {
            available = running;
        } else {
            available = available.min(running);
        }
    }
    available
}

/// Validate that selling `quantity` at `as_of` keeps every prefix of
/// the merged sequence non-negative.
pub fn validate_sell(
    transactions: &[Transaction],
    as_of: DateTime<Utc>,
    quantity: Decimal,
) -> Result<(), OversellError> {
    let available = available_to_sell(transactions, as_of);
    if quantity > available {
        return Err(OversellError {
            available,
            requested: quantity,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OversellError {
    pub available: Decimal,
    pub requested: Decimal,
}

impl std::fmt::Display for OversellError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to be sold, but only {} available",
            self.requested, self.available
        )
    }
}

impl std::error::Error for OversellError {}

/// How sells are matched against earlier buys when computing the cost
/// of the still-held portion of a position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostBasisMethod {
    /// Earliest-purchased shares are considered sold first.
    #[default]
    Fifo,
    /// Every held share carries the running average cost.
    AverageCost,
}

impl CostBasisMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CostBasisMethod::Fifo => "fifo",
            CostBasisMethod::AverageCost => "average",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "fifo" => Some(CostBasisMethod::Fifo),
            "average" => Some(CostBasisMethod::AverageCost),
            _ => None,
        }
    }
}

/// Cost of the portion of the position still held after replaying the
/// given transactions: quantity x unit price plus fees, with sells
/// matched against buys per `method`. Buy fees are consumed
/// proportionally as their lot is sold off. Deterministic for a given
/// history. Transactions must be sorted by (timestamp, sequence).
pub fn cost_basis(transactions: &[Transaction], method: CostBasisMethod) -> Decimal {
    match method {
        CostBasisMethod::Fifo => fifo_cost_basis(transactions),
        CostBasisMethod::AverageCost => average_cost_basis(transactions),
    }
}

struct Lot {
    remaining: Decimal,
    original: Decimal,
    unit_price: Decimal,
    fee: Decimal,
}

fn fifo_cost_basis(transactions: &[Transaction]) -> Decimal {
    let mut lots: VecDeque<Lot> = VecDeque::new();

    for t in transactions {
        match t.side {
            TradeSide::Buy => lots.push_back(Lot {
                remaining: t.quantity,
                original: t.quantity,
                unit_price: t.unit_price,
                fee: t.fee,
            }),
            TradeSide::Sell => {
                let mut to_consume = t.quantity;
                while to_consume > Decimal::ZERO {
                    let Some(front) = lots.front_mut() else {
                        break;
                    };
                    let taken = front.remaining.min(to_consume);
                    front.remaining -= taken;
                    to_consume -= taken;
                    if front.remaining.is_zero() {
                        lots.pop_front();
                    }
                }
            }
        }
    }

    lots.iter()
        .map(|lot| lot.remaining * lot.unit_price + lot.fee * (lot.remaining / lot.original))
        .sum()
}

fn average_cost_basis(transactions: &[Transaction]) -> Decimal {
    let mut held = Decimal::ZERO;
    let mut cost = Decimal::ZERO;

    for t in transactions {
        match t.side {
            TradeSide::Buy => {
                held += t.quantity;
                cost += t.total_cost();
            }
            TradeSide::Sell => {
                if held > Decimal::ZERO {
                    let sold = t.quantity.min(held);
                    cost -= cost * (sold / held);
                    held -= sold;
                }
            }
        }
    }
    cost
}

/// Net cash balance from a user's deposits and withdrawals.
pub fn cash_balance(transfers: &[CashTransfer]) -> Decimal {
    transfers.iter().map(CashTransfer::signed_amount).sum()
}

/// Ledger-wide consistency report.
#[derive(Debug, Clone)]
pub struct IntegrityReport {
    pub user_count: i64,
    pub stock_count: i64,
    pub price_count: i64,
    pub transaction_count: i64,
    pub has_sequence_gaps: bool,
    pub invalid_user_refs: i64,
    pub invalid_stock_refs: i64,
    pub invalid_quantities: usize,
    pub oversold_pairs: Vec<(UserId, StockId)>,
}

impl IntegrityReport {
    pub fn is_ok(&self) -> bool {
        !self.has_sequence_gaps
            && self.invalid_user_refs == 0
            && self.invalid_stock_refs == 0
            && self.invalid_quantities == 0
            && self.oversold_pairs.is_empty()
    }
}

/// Find (user, stock) pairs whose replayed position goes negative at
/// some prefix of the history. Transactions must be sorted by
/// (timestamp, sequence).
pub fn find_oversold(transactions: &[Transaction]) -> Vec<(UserId, StockId)> {
    let mut running: HashMap<(UserId, StockId), Decimal> = HashMap::new();
    let mut flagged: Vec<(UserId, StockId)> = Vec::new();

    for t in transactions {
        let key = (t.user_id, t.stock_id);
        let position = running.entry(key).or_insert(Decimal::ZERO);
        *position += t.signed_quantity();
        if *position < Decimal::ZERO && !flagged.contains(&key) {
            flagged.push(key);
        }
    }
    flagged
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use super::*;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    fn trade(
        user: UserId,
        stock: StockId,
        side: TradeSide,
        quantity: Decimal,
        price: Decimal,
        ts: DateTime<Utc>,
        sequence: i64,
    ) -> Transaction {
        let mut t = Transaction::new(user, stock, side, quantity, price, ts);
        t.sequence = sequence;
        t
    }

    fn sample_history() -> (UserId, StockId, Vec<Transaction>) {
        let user = Uuid::new_v4();
        let stock = Uuid::new_v4();
        let history = vec![
            trade(user, stock, TradeSide::Buy, dec!(10), dec!(5.00), day(1), 1),
            trade(user, stock, TradeSide::Buy, dec!(5), dec!(6.00), day(2), 2),
            trade(user, stock, TradeSide::Sell, dec!(12), dec!(7.00), day(3), 3),
        ];
        (user, stock, history)
    }

    #[test]
    fn test_position_empty() {
        assert_eq!(position_at(&[], day(1)), Decimal::ZERO);
        assert_eq!(net_position(&[]), Decimal::ZERO);
    }

    #[test]
    fn test_position_replay() {
        let (_, _, history) = sample_history();
        assert_eq!(position_at(&history, day(1)), dec!(10));
        assert_eq!(position_at(&history, day(2)), dec!(15));
        assert_eq!(position_at(&history, day(3)), dec!(3));
        assert_eq!(net_position(&history), dec!(3));
    }

    #[test]
    fn test_available_to_sell_at_end() {
        let (_, _, history) = sample_history();
        assert_eq!(available_to_sell(&history, day(4)), dec!(3));
    }

    #[test]
    fn test_available_to_sell_is_bounded_by_later_history() {
        // Selling everything on day 3 means nothing extra can be sold
        // on day 2 even though 15 shares were held then.
        let user = Uuid::new_v4();
        let stock = Uuid::new_v4();
        let history = vec![
            trade(user, stock, TradeSide::Buy, dec!(10), dec!(5.00), day(1), 1),
            trade(user, stock, TradeSide::Sell, dec!(10), dec!(7.00), day(3), 2),
        ];

        assert_eq!(available_to_sell(&history, day(2)), dec!(0));
        assert!(validate_sell(&history, day(2), dec!(1)).is_err());
    }

    #[test]
    fn test_validate_sell() {
        let (_, _, history) = sample_history();
        assert!(validate_sell(&history, day(4), dec!(3)).is_ok());

        let err = validate_sell(&history, day(4), dec!(4)).unwrap_err();
        assert_eq!(err.available, dec!(3));
        assert_eq!(err.requested, dec!(4));
    }

    #[test]
    fn test_fifo_cost_basis_partial_lot() {
        // 10 @ 5.00 fully consumed, 2 of 5 @ 6.00 consumed -> 3 @ 6.00 left.
        let (_, _, history) = sample_history();
        assert_eq!(cost_basis(&history, CostBasisMethod::Fifo), dec!(18.00));
    }

    #[test]
    fn test_fifo_cost_basis_consumes_fees_proportionally() {
        let user = Uuid::new_v4();
        let stock = Uuid::new_v4();
        let history = vec![
            trade(user, stock, TradeSide::Buy, dec!(10), dec!(5.00), day(1), 1).with_fee(dec!(2.00)),
            trade(user, stock, TradeSide::Sell, dec!(5), dec!(7.00), day(2), 2),
        ];

        // Half the lot remains, so half its fee remains in the basis.
        assert_eq!(
            cost_basis(&history, CostBasisMethod::Fifo),
            dec!(25.00) + dec!(1.00)
        );
    }

    #[test]
    fn test_fifo_cost_basis_empty_after_full_sale() {
        let user = Uuid::new_v4();
        let stock = Uuid::new_v4();
        let history = vec![
            trade(user, stock, TradeSide::Buy, dec!(10), dec!(5.00), day(1), 1),
            trade(user, stock, TradeSide::Sell, dec!(10), dec!(7.00), day(2), 2),
        ];

        assert_eq!(cost_basis(&history, CostBasisMethod::Fifo), Decimal::ZERO);
    }

    #[test]
    fn test_average_cost_basis() {
        // 10 @ 5.00 + 5 @ 6.00 = 15 shares costing 80.00, average
        // 5.333...; selling 12 leaves 3 shares at the average.
        let (_, _, history) = sample_history();
        let basis = cost_basis(&history, CostBasisMethod::AverageCost);
        assert_eq!(basis.round_dp(2), dec!(16.00));
    }

    #[test]
    fn test_cost_basis_methods_agree_with_no_sells() {
        let user = Uuid::new_v4();
        let stock = Uuid::new_v4();
        let history = vec![
            trade(user, stock, TradeSide::Buy, dec!(10), dec!(5.00), day(1), 1).with_fee(dec!(1.00)),
            trade(user, stock, TradeSide::Buy, dec!(5), dec!(6.00), day(2), 2),
        ];

        assert_eq!(cost_basis(&history, CostBasisMethod::Fifo), dec!(81.00));
        assert_eq!(
            cost_basis(&history, CostBasisMethod::AverageCost),
            dec!(81.00)
        );
    }

    #[test]
    fn test_cash_balance() {
        use crate::domain::{CashDirection, CashTransfer};

        let user = Uuid::new_v4();
        let transfers = vec![
            CashTransfer::new(user, CashDirection::Deposit, dec!(100), day(1)),
            CashTransfer::new(user, CashDirection::Withdrawal, dec!(30), day(2)),
        ];
        assert_eq!(cash_balance(&transfers), dec!(70));
        assert_eq!(cash_balance(&[]), Decimal::ZERO);
    }

    #[test]
    fn test_find_oversold() {
        let user = Uuid::new_v4();
        let stock = Uuid::new_v4();
        let clean = sample_history().2;
        assert!(find_oversold(&clean).is_empty());

        let broken = vec![
            trade(user, stock, TradeSide::Buy, dec!(5), dec!(5.00), day(1), 1),
            trade(user, stock, TradeSide::Sell, dec!(8), dec!(7.00), day(2), 2),
        ];
        assert_eq!(find_oversold(&broken), vec![(user, stock)]);
    }
}
