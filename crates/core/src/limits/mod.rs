//! Daily and monthly spend limits.
//!
//! Windows are calendar day and calendar month in the wallet's timezone. A
//! transaction belongs to a window when `start <= completed_at < next_start`.

pub mod policy;
pub mod window;

#[cfg(test)]
mod policy_props;

pub use policy::{SpendCaps, SpendRecord, SpendTotals, check_limits};
pub use window::{SpendWindows, parse_timezone};
