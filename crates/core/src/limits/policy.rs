//! Spend caps and the limit check.

use campuspay_shared::types::Money;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::window::SpendWindows;
use crate::error::{LimitWindow, WalletError, WalletResult};
use crate::wallet::{TransactionKind, TransactionStatus};

/// One transaction as seen by the limit policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendRecord {
    /// Transaction kind.
    pub kind: TransactionKind,
    /// Signed amount; debits are negative.
    pub amount: Money,
    /// Lifecycle status.
    pub status: TransactionStatus,
    /// Completion time, set once completed.
    pub completed_at: Option<DateTime<Utc>>,
}

impl SpendRecord {
    /// Spend contributed by this record: the absolute amount of a completed
    /// debit of a limit-relevant kind, else zero. Fees are excluded.
    #[must_use]
    pub fn spend(&self) -> Money {
        if self.status == TransactionStatus::Completed
            && self.kind.counts_toward_limits()
            && self.amount.is_negative()
        {
            self.amount.abs()
        } else {
            Money::ZERO
        }
    }
}

/// Spent totals for the current day and month.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SpendTotals {
    /// Spent today.
    pub daily: Money,
    /// Spent this month.
    pub monthly: Money,
}

impl SpendTotals {
    /// Sums the spend of `records` falling in `windows`.
    pub fn from_records<'a>(
        records: impl IntoIterator<Item = &'a SpendRecord>,
        windows: &SpendWindows,
    ) -> Self {
        let mut totals = Self::default();
        for record in records {
            let Some(at) = record.completed_at else {
                continue;
            };
            let spend = record.spend();
            if windows.in_day(at) {
                totals.daily += spend;
            }
            if windows.in_month(at) {
                totals.monthly += spend;
            }
        }
        totals
    }
}

/// Per-wallet caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpendCaps {
    /// Daily cap.
    pub daily: Money,
    /// Monthly cap.
    pub monthly: Money,
}

impl SpendCaps {
    /// Allowance left in each window, never below zero.
    #[must_use]
    pub fn remaining(&self, spent: &SpendTotals) -> SpendTotals {
        SpendTotals {
            daily: (self.daily - spent.daily).max(Money::ZERO),
            monthly: (self.monthly - spent.monthly).max(Money::ZERO),
        }
    }
}

/// Rejects `requested` when `spent + requested > cap`, daily first.
pub fn check_limits(caps: &SpendCaps, spent: &SpendTotals, requested: Money) -> WalletResult<()> {
    let windows = [
        (LimitWindow::Daily, caps.daily, spent.daily),
        (LimitWindow::Monthly, caps.monthly, spent.monthly),
    ];
    for (window, cap, already) in windows {
        let total = already.checked_add(requested).ok_or_else(|| {
            WalletError::InvalidAmount("amount out of range".to_string())
        })?;
        if total > cap {
            return Err(WalletError::LimitExceeded {
                window,
                cap,
                spent: already,
                requested,
            });
        }
    }
    Ok(())
}
