//! Transfer planning.
//!
//! The planner turns a locked view of the sender, recipient and fee-sink
//! wallets into the exact legs the store applies in one unit of work:
//! sender debit, receiver credit (net of fee) and fee-sink credit.

pub mod planner;
pub mod types;

#[cfg(test)]
mod planner_props;

pub use planner::TransferPlanner;
pub use types::{
    LegPlan, PartyState, RecipientSelector, TransferChannel, TransferContext, TransferPlan,
    TransferRequest,
};
