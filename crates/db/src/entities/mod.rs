//! `SeaORM` entity definitions.

pub mod prelude;

pub mod holds;
pub mod merchants;
pub mod recipients;
pub mod sea_orm_active_enums;
pub mod wallet_transactions;
pub mod wallets;
