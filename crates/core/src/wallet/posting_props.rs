//! Property-based tests for posting math.
//!
//! Any sequence of accepted postings keeps both balances non-negative, keeps
//! `available <= balance`, and replays to the final balance.

use campuspay_shared::types::Money;
use proptest::prelude::*;

use super::audit::{ReplayEntry, replay};
use super::posting::{BalanceSnapshot, apply_net, reserve, unreserve};

/// A single operation against a wallet.
#[derive(Debug, Clone)]
enum Op {
    Post(i64),
    Hold(i64),
    Release,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (-50_000i64..50_000i64)
            .prop_filter("non-zero", |v| *v != 0)
            .prop_map(Op::Post),
        (1i64..20_000i64).prop_map(Op::Hold),
        Just(Op::Release),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Rejected operations leave the snapshot untouched; accepted ones keep
    /// every balance invariant and the completed postings replay exactly.
    #[test]
    fn prop_postings_preserve_invariants(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let mut state = BalanceSnapshot { balance: Money::ZERO, available: Money::ZERO };
        let mut holds: Vec<Money> = Vec::new();
        let mut entries: Vec<ReplayEntry> = Vec::new();

        for (i, op) in ops.into_iter().enumerate() {
            match op {
                Op::Post(net) => {
                    if let Ok(posting) = apply_net(state, Money::from_minor(net)) {
                        entries.push(ReplayEntry {
                            reference: format!("REF-{i}"),
                            balance_before: posting.before.balance,
                            balance_after: posting.after.balance,
                            net_amount: posting.net,
                        });
                        state = posting.after;
                    }
                }
                Op::Hold(amount) => {
                    if let Ok(next) = reserve(state, Money::from_minor(amount)) {
                        holds.push(Money::from_minor(amount));
                        state = next;
                    }
                }
                Op::Release => {
                    if let Some(amount) = holds.pop() {
                        state = unreserve(state, amount).unwrap();
                    }
                }
            }

            prop_assert!(!state.available.is_negative());
            prop_assert!(state.available <= state.balance);
            let held: Money = holds.iter().copied().sum();
            prop_assert_eq!(state.balance - held, state.available);
        }

        prop_assert_eq!(replay(&entries).unwrap(), state.balance);
    }
}
