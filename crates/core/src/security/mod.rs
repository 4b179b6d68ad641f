//! Security state kept outside the ledger: PIN attempt limiting.

pub mod limiter;

pub use limiter::AttemptLimiter;
