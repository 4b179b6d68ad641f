//! Balance math for applying a transaction or a hold to a wallet.
//!
//! All functions are pure: they take the locked pre-operation balances and
//! return the post-operation balances, or the error that must abort the
//! unit of work.

use campuspay_shared::types::Money;
use serde::Serialize;

use crate::error::{WalletError, WalletResult};

/// Balances of one wallet at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BalanceSnapshot {
    /// Ledger balance.
    pub balance: Money,
    /// Balance minus active holds.
    pub available: Money,
}

impl BalanceSnapshot {
    /// Creates a snapshot, checking `0 <= available <= balance`.
    pub fn new(balance: Money, available: Money) -> WalletResult<Self> {
        let snapshot = Self { balance, available };
        snapshot.check()?;
        Ok(snapshot)
    }

    /// Sum of active holds implied by the snapshot.
    #[must_use]
    pub fn held(&self) -> Money {
        self.balance - self.available
    }

    fn check(&self) -> WalletResult<()> {
        if self.available.is_negative() || self.balance.is_negative() {
            return Err(WalletError::InvariantViolation(format!(
                "negative balance: balance {}, available {}",
                self.balance, self.available
            )));
        }
        if self.available > self.balance {
            return Err(WalletError::InvariantViolation(format!(
                "available {} exceeds balance {}",
                self.available, self.balance
            )));
        }
        Ok(())
    }
}

/// Result of posting a transaction: the before/after pair stored on the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posting {
    /// Balances before the transaction.
    pub before: BalanceSnapshot,
    /// Balances after the transaction.
    pub after: BalanceSnapshot,
    /// Net amount applied.
    pub net: Money,
}

/// Computes `amount - fee` after validating the pair.
///
/// The amount must be non-zero and the fee non-negative. A credit must not
/// be fully consumed by its fee.
pub fn net_amount(amount: Money, fee: Money) -> WalletResult<Money> {
    if amount.is_zero() {
        return Err(WalletError::InvalidAmount(
            "amount must be non-zero".to_string(),
        ));
    }
    if fee.is_negative() {
        return Err(WalletError::InvalidAmount(
            "fee must not be negative".to_string(),
        ));
    }
    let net = amount
        .checked_sub(fee)
        .ok_or_else(|| WalletError::InvalidAmount("amount out of range".to_string()))?;
    if amount.is_positive() && !net.is_positive() {
        return Err(WalletError::InvalidAmount(format!(
            "amount {amount} does not cover fee {fee}"
        )));
    }
    Ok(net)
}

/// Applies `net` to both balance and available balance.
///
/// A debit that would take `available` below zero fails with
/// `InsufficientFunds`, checked against the pre-operation value.
pub fn apply_net(before: BalanceSnapshot, net: Money) -> WalletResult<Posting> {
    before.check()?;
    if net.is_negative() && before.available < net.abs() {
        return Err(WalletError::InsufficientFunds {
            available: before.available,
            required: net.abs(),
        });
    }
    let balance = before
        .balance
        .checked_add(net)
        .ok_or_else(|| WalletError::InvariantViolation("balance overflow".to_string()))?;
    let available = before
        .available
        .checked_add(net)
        .ok_or_else(|| WalletError::InvariantViolation("balance overflow".to_string()))?;
    let after = BalanceSnapshot { balance, available };
    after.check()?;
    Ok(Posting { before, after, net })
}

/// Reserves `amount` from the available balance for a hold.
pub fn reserve(before: BalanceSnapshot, amount: Money) -> WalletResult<BalanceSnapshot> {
    if !amount.is_positive() {
        return Err(WalletError::InvalidAmount(
            "hold amount must be positive".to_string(),
        ));
    }
    before.check()?;
    if before.available < amount {
        return Err(WalletError::InsufficientFunds {
            available: before.available,
            required: amount,
        });
    }
    let after = BalanceSnapshot {
        balance: before.balance,
        available: before.available - amount,
    };
    after.check()?;
    Ok(after)
}

/// Returns a released hold's amount to the available balance.
pub fn unreserve(before: BalanceSnapshot, amount: Money) -> WalletResult<BalanceSnapshot> {
    let available = before
        .available
        .checked_add(amount)
        .ok_or_else(|| WalletError::InvariantViolation("balance overflow".to_string()))?;
    let after = BalanceSnapshot {
        balance: before.balance,
        available,
    };
    after.check()?;
    Ok(after)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn snap(balance: i64, available: i64) -> BalanceSnapshot {
        BalanceSnapshot::new(Money::from_minor(balance), Money::from_minor(available)).unwrap()
    }

    #[rstest]
    #[case(5_000, 0, 5_000)]
    #[case(5_000, 100, 4_900)]
    #[case(-5_000, 0, -5_000)]
    #[case(-2_000, 1_500, -3_500)]
    fn test_net_amount(#[case] amount: i64, #[case] fee: i64, #[case] expected: i64) {
        let net = net_amount(Money::from_minor(amount), Money::from_minor(fee)).unwrap();
        assert_eq!(net, Money::from_minor(expected));
    }

    #[rstest]
    #[case(0, 0)]
    #[case(100, -1)]
    #[case(100, 100)]
    #[case(100, 150)]
    fn test_net_amount_rejects(#[case] amount: i64, #[case] fee: i64) {
        let result = net_amount(Money::from_minor(amount), Money::from_minor(fee));
        assert!(matches!(result, Err(WalletError::InvalidAmount(_))));
    }

    #[test]
    fn test_apply_credit() {
        let posting = apply_net(snap(1_000, 800), Money::from_minor(500)).unwrap();
        assert_eq!(posting.after, snap(1_500, 1_300));
        assert_eq!(posting.before.held(), posting.after.held());
    }

    #[test]
    fn test_apply_debit_checks_available_not_balance() {
        let result = apply_net(snap(10_000, 4_000), Money::from_minor(-6_000));
        assert_eq!(
            result,
            Err(WalletError::InsufficientFunds {
                available: Money::from_minor(4_000),
                required: Money::from_minor(6_000),
            })
        );
    }

    #[test]
    fn test_apply_debit_to_exactly_zero() {
        let posting = apply_net(snap(6_000, 6_000), Money::from_minor(-6_000)).unwrap();
        assert_eq!(posting.after, snap(0, 0));
    }

    #[test]
    fn test_snapshot_rejects_available_above_balance() {
        let result = BalanceSnapshot::new(Money::from_minor(10), Money::from_minor(11));
        assert!(matches!(result, Err(WalletError::InvariantViolation(_))));
    }

    #[test]
    fn test_reserve_and_unreserve() {
        let held = reserve(snap(3_000, 3_000), Money::from_minor(2_500)).unwrap();
        assert_eq!(held, snap(3_000, 500));
        let released = unreserve(held, Money::from_minor(2_500)).unwrap();
        assert_eq!(released, snap(3_000, 3_000));
    }

    #[test]
    fn test_reserve_insufficient() {
        let result = reserve(snap(3_000, 3_000), Money::from_minor(3_500));
        assert!(matches!(result, Err(WalletError::InsufficientFunds { .. })));
    }

    #[test]
    fn test_unreserve_beyond_balance_is_invariant_violation() {
        let result = unreserve(snap(3_000, 3_000), Money::from_minor(1));
        assert!(matches!(result, Err(WalletError::InvariantViolation(_))));
    }
}
