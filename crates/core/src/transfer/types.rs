//! Transfer domain types.

use campuspay_shared::types::{MerchantId, Money, UserId, WalletId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::limits::{SpendCaps, SpendTotals};
use crate::wallet::{BalanceSnapshot, TransactionKind};

/// How the caller identifies the recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RecipientSelector {
    /// Recipient's owner id.
    UserId(UserId),
    /// Recipient wallet's contact handle.
    Handle(String),
    /// Merchant profile id.
    Merchant(MerchantId),
}

impl fmt::Display for RecipientSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserId(id) => write!(f, "user {id}"),
            Self::Handle(handle) => write!(f, "handle {handle}"),
            Self::Merchant(id) => write!(f, "merchant {id}"),
        }
    }
}

/// Which fee schedule and transaction kinds apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferChannel {
    /// Peer-to-peer transfer.
    Peer,
    /// Payment to a merchant with an optional fee rate override (percent).
    Merchant {
        /// Merchant-specific rate.
        fee_rate: Option<Decimal>,
    },
}

impl TransferChannel {
    /// Kinds of the debit and credit legs.
    #[must_use]
    pub fn leg_kinds(&self) -> (TransactionKind, TransactionKind) {
        match self {
            Self::Peer => (TransactionKind::TransferSend, TransactionKind::TransferReceive),
            Self::Merchant { .. } => (TransactionKind::Payment, TransactionKind::Payment),
        }
    }
}

/// Locked view of one wallet taking part in a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartyState {
    /// Wallet id.
    pub wallet_id: WalletId,
    /// Owner id.
    pub owner_id: UserId,
    /// Current balances.
    pub balances: BalanceSnapshot,
    /// Active flag.
    pub is_active: bool,
    /// Verified flag (required to receive merchant payments).
    pub is_verified: bool,
    /// Fee-sink wallet flag.
    pub is_system: bool,
}

/// A transfer request after PIN verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    /// Base reference of the operation.
    pub base_reference: String,
    /// Amount debited from the sender.
    pub amount: Money,
    /// Fee schedule selector.
    pub channel: TransferChannel,
    /// Free-text description stored on every leg.
    pub description: Option<String>,
}

/// Everything the planner reads, captured under the wallet locks.
#[derive(Debug, Clone)]
pub struct TransferContext<'a> {
    /// Sender wallet.
    pub sender: &'a PartyState,
    /// Resolved recipient, `None` if resolution failed.
    pub recipient: Option<&'a PartyState>,
    /// How the recipient was named, for error messages.
    pub selector: &'a RecipientSelector,
    /// Fee-sink wallet.
    pub fee_sink: &'a PartyState,
    /// Sender's caps.
    pub caps: SpendCaps,
    /// Sender's spend in the current windows.
    pub spent: SpendTotals,
}

/// One row the store must apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegPlan {
    /// Wallet the leg posts to.
    pub wallet_id: WalletId,
    /// Leg reference.
    pub reference: String,
    /// Transaction kind.
    pub kind: TransactionKind,
    /// Signed amount.
    pub amount: Money,
    /// Fee deducted from this leg.
    pub fee: Money,
    /// Other side of the movement.
    pub counterparty: Option<WalletId>,
}

impl LegPlan {
    /// `amount - fee`.
    #[must_use]
    pub fn net(&self) -> Money {
        self.amount - self.fee
    }
}

/// Legs of one transfer plus its totals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    /// Base reference.
    pub base_reference: String,
    /// Amount debited from the sender.
    pub amount: Money,
    /// Fee credited to the fee sink.
    pub fee: Money,
    /// Amount the recipient receives.
    pub net: Money,
    /// Legs in application order.
    pub legs: Vec<LegPlan>,
}
