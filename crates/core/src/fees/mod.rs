//! Fee schedule.
//!
//! Pure, table-driven fee computation. All percentages round half away from
//! zero to the nearest minor unit.

pub mod policy;

#[cfg(test)]
mod policy_props;

pub use policy::{FeeKind, FeePolicy, bps_to_rate};
