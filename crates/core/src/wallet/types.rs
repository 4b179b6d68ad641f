//! Wallet transaction kinds and lifecycle statuses.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{WalletError, WalletResult};

/// Kind of balance-affecting event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// External funding credited to the wallet.
    Deposit,
    /// External payout debited from the wallet.
    Withdrawal,
    /// Sender leg of a peer transfer.
    TransferSend,
    /// Receiver leg of a peer transfer.
    TransferReceive,
    /// Merchant or bill payment (debit for the payer, credit for the merchant).
    Payment,
    /// Fee collected into the fee-sink wallet.
    Fee,
    /// Money returned to the wallet.
    Refund,
}

impl TransactionKind {
    /// All kinds, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Deposit,
        Self::Withdrawal,
        Self::TransferSend,
        Self::TransferReceive,
        Self::Payment,
        Self::Fee,
        Self::Refund,
    ];

    /// Returns the string representation of the kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
            Self::TransferSend => "transfer_send",
            Self::TransferReceive => "transfer_receive",
            Self::Payment => "payment",
            Self::Fee => "fee",
            Self::Refund => "refund",
        }
    }

    /// Parses a kind from a string.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    /// Returns true if debits of this kind count toward spend limits.
    #[must_use]
    pub fn counts_toward_limits(&self) -> bool {
        matches!(self, Self::TransferSend | Self::Payment | Self::Withdrawal)
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transaction lifecycle status.
///
/// Valid transitions:
/// - Pending → Processing | Completed | Failed | Cancelled
/// - Processing → Completed | Failed | Cancelled
///
/// Terminal statuses never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Recorded, waiting for an external event.
    Pending,
    /// Funds reserved, external settlement in flight.
    Processing,
    /// Applied to the balance.
    Completed,
    /// Closed without touching the balance.
    Failed,
    /// Withdrawn by the system before settlement.
    Cancelled,
}

impl TransactionStatus {
    /// Returns the string representation of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses a status from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Returns true once the status can no longer change.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns true if `self → next` is a forward transition.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        match self {
            Self::Pending => next != Self::Pending,
            Self::Processing => next.is_terminal(),
            Self::Completed | Self::Failed | Self::Cancelled => false,
        }
    }

    /// Returns `next` if the transition is allowed.
    pub fn transition(self, next: Self) -> WalletResult<Self> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(WalletError::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
