//! Wallet ledger primitives.
//!
//! - Transaction kinds and lifecycle statuses
//! - Posting math (net amount, balance/available updates, hold reservation)
//! - Transaction references and per-leg sub-references
//! - Ledger audit (balance replay, hold conservation)

pub mod audit;
pub mod posting;
pub mod reference;
pub mod types;

#[cfg(test)]
mod posting_props;

pub use audit::{AuditReport, ReplayEntry, audit_wallet, replay};
pub use posting::{BalanceSnapshot, Posting, apply_net, net_amount, reserve, unreserve};
pub use reference::{Leg, ReferencePrefix, leg_reference, validate_reference};
pub use types::{TransactionKind, TransactionStatus};
