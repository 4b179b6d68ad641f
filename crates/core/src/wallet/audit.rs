//! Ledger audit: replay completed transactions and check hold conservation.

use campuspay_shared::types::Money;
use serde::Serialize;

use crate::error::{WalletError, WalletResult};

/// One completed transaction as seen by the audit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayEntry {
    /// Transaction reference.
    pub reference: String,
    /// Stored balance before.
    pub balance_before: Money,
    /// Stored balance after.
    pub balance_after: Money,
    /// Stored net amount.
    pub net_amount: Money,
}

/// Outcome of a successful audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    /// Number of completed transactions replayed.
    pub transactions: usize,
    /// Balance reproduced by the replay.
    pub replayed_balance: Money,
    /// Sum of active holds.
    pub held: Money,
}

/// Replays completed transactions in completion order from a zero balance.
///
/// Every entry must start where the previous one ended and must satisfy
/// `balance_after == balance_before + net_amount`.
pub fn replay(entries: &[ReplayEntry]) -> WalletResult<Money> {
    let mut running = Money::ZERO;
    for entry in entries {
        if entry.balance_before != running {
            return Err(WalletError::InvariantViolation(format!(
                "gap before {}: expected balance {running}, recorded {}",
                entry.reference, entry.balance_before
            )));
        }
        let expected = entry
            .balance_before
            .checked_add(entry.net_amount)
            .ok_or_else(|| WalletError::InvariantViolation("balance overflow".to_string()))?;
        if entry.balance_after != expected {
            return Err(WalletError::InvariantViolation(format!(
                "{}: balance_after {} != balance_before {} + net {}",
                entry.reference, entry.balance_after, entry.balance_before, entry.net_amount
            )));
        }
        running = entry.balance_after;
    }
    Ok(running)
}

/// Audits a wallet: replayed balance must equal the stored balance and
/// `available == balance - active holds`.
pub fn audit_wallet(
    balance: Money,
    available: Money,
    active_holds: Money,
    entries: &[ReplayEntry],
) -> WalletResult<AuditReport> {
    let replayed = replay(entries)?;
    if replayed != balance {
        return Err(WalletError::InvariantViolation(format!(
            "replayed balance {replayed} != stored balance {balance}"
        )));
    }
    if balance - active_holds != available {
        return Err(WalletError::InvariantViolation(format!(
            "available {available} != balance {balance} - holds {active_holds}"
        )));
    }
    Ok(AuditReport {
        transactions: entries.len(),
        replayed_balance: replayed,
        held: active_holds,
    })
}
