//! Core wallet ledger logic for Campuspay.
//!
//! This crate contains pure business logic with ZERO web or database dependencies.
//! All domain types, policies, and state machines live here; the `campuspay-db`
//! crate executes them inside database transactions.
//!
//! # Modules
//!
//! - `wallet` - Transaction kinds/statuses, posting math, references, ledger audit
//! - `fees` - Fee schedule per operation kind
//! - `limits` - Daily/monthly spend windows and caps
//! - `holds` - Hold lifecycle rules
//! - `transfer` - Transfer planning (legs, fees, conservation)
//! - `settlement` - Payment gateway capability and settlement state machines
//! - `qr` - QR payment payload codec
//! - `security` - PIN attempt limiting
//! - `pin` - PIN hashing with Argon2id

pub mod error;
pub mod fees;
pub mod holds;
pub mod limits;
pub mod pin;
pub mod qr;
pub mod security;
pub mod settlement;
pub mod transfer;
pub mod wallet;

pub use error::{LimitWindow, WalletError, WalletResult};
