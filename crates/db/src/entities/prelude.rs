//! `SeaORM` entity prelude.

pub use super::holds::Entity as Holds;
pub use super::merchants::Entity as Merchants;
pub use super::recipients::Entity as Recipients;
pub use super::wallet_transactions::Entity as WalletTransactions;
pub use super::wallets::Entity as Wallets;
