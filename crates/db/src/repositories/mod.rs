//! Repository abstractions for data access.
//!
//! Repositories provide a clean interface for database operations,
//! hiding the `SeaORM` implementation details from the rest of the application.
//! Every money movement goes through the helpers in `ledger`, which run
//! inside a caller-owned unit of work.

mod ledger;

pub mod hold;
pub mod merchant;
pub mod recipient;
pub mod settlement;
pub mod transfer;
pub mod wallet;

pub use hold::{HoldRepository, HoldView};
pub use ledger::{
    AppliedTransaction, HOLD_CANCELLED, HoldRelease, NewHold, NewTransaction, ReleasedHold,
    SETTLEMENT_TIMED_OUT,
};
pub use merchant::{MAX_FEE_BPS, MerchantRepository, RegisterMerchant};
pub use recipient::RecipientRepository;
pub use settlement::{
    FundingCommand, FundingInit, PayoutCommand, PayoutReceipt, PayoutSweep, ReconcileReport,
    SettlementOptions, SettlementService,
};
pub use transfer::{TransferCommand, TransferReceipt, TransferService};
pub use wallet::{
    CreateWallet, TransactionFilter, WalletRepository, WalletSummary, normalize_handle,
};
