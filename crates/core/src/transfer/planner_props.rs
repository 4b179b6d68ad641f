//! Property-based tests for transfer conservation.

use campuspay_shared::types::{Money, UserId, WalletId};
use proptest::prelude::*;

use super::planner::TransferPlanner;
use super::types::{PartyState, RecipientSelector, TransferChannel, TransferContext, TransferRequest};
use crate::fees::bps_to_rate;
use crate::limits::{SpendCaps, SpendTotals};
use crate::wallet::BalanceSnapshot;

fn party(balance: i64, verified: bool, system: bool) -> PartyState {
    PartyState {
        wallet_id: WalletId::new(),
        owner_id: UserId::new(),
        balances: BalanceSnapshot::new(Money::from_minor(balance), Money::from_minor(balance)).unwrap(),
        is_active: true,
        is_verified: verified,
        is_system: system,
    }
}

fn channel() -> impl Strategy<Value = TransferChannel> {
    prop_oneof![
        Just(TransferChannel::Peer),
        (0u32..1_000u32).prop_map(|bps| TransferChannel::Merchant { fee_rate: Some(bps_to_rate(bps)) }),
        Just(TransferChannel::Merchant { fee_rate: None }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// Every accepted plan conserves money: the sender debit equals the
    /// recipient credit plus the fee, and the legs net to zero.
    #[test]
    fn prop_transfer_conserves_money(
        balance in 0i64..10_000_000i64,
        amount in 1i64..10_000_000i64,
        channel in channel(),
    ) {
        let sender = party(balance, false, false);
        let recipient = party(0, true, false);
        let sink = party(0, false, true);
        let selector = RecipientSelector::UserId(recipient.owner_id);
        let ctx = TransferContext {
            sender: &sender,
            recipient: Some(&recipient),
            selector: &selector,
            fee_sink: &sink,
            caps: SpendCaps { daily: Money::from_minor(i64::MAX / 4), monthly: Money::from_minor(i64::MAX / 4) },
            spent: SpendTotals::default(),
        };
        let req = TransferRequest {
            base_reference: "TRF-PROP".to_string(),
            amount: Money::from_minor(amount),
            channel,
            description: None,
        };

        match TransferPlanner::default().plan(&ctx, &req) {
            Ok(plan) => {
                let debit = plan.legs[0].net();
                let credit = plan.legs[1].net();
                prop_assert_eq!(-debit, credit + plan.fee);
                prop_assert_eq!(plan.legs.iter().map(|l| l.net()).sum::<Money>(), Money::ZERO);
                prop_assert!(credit.is_positive());
                prop_assert!(amount <= balance);
            }
            Err(_) => {
                let fee_floor_hit = matches!(channel, TransferChannel::Peer) && amount <= 100;
                prop_assert!(amount > balance || fee_floor_hit);
            }
        }
    }
}
