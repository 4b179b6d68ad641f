//! Property-based tests for fee rounding.

use campuspay_shared::types::Money;
use proptest::prelude::*;
use rust_decimal::Decimal;

use super::policy::{FeeKind, FeePolicy, bps_to_rate};

fn amount() -> impl Strategy<Value = i64> {
    1i64..1_000_000_000i64
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// A percentage fee is within half a minor unit of the exact value.
    #[test]
    fn prop_rounding_within_half_unit(minor in amount(), bps in 0u32..10_000u32) {
        let fee = FeePolicy::default()
            .compute_fee(FeeKind::MerchantPayment, Money::from_minor(minor), Some(bps_to_rate(bps)))
            .unwrap();
        let exact = Decimal::from(minor) * Decimal::from(bps) / Decimal::from(10_000);
        let diff = (Decimal::from(fee.minor()) - exact).abs();
        prop_assert!(diff <= Decimal::new(5, 1), "fee {} exact {}", fee, exact);
    }

    /// Transfer and bill fees never drop below their minimum.
    #[test]
    fn prop_minimums_hold(minor in amount()) {
        let policy = FeePolicy::default();
        let amount = Money::from_minor(minor);
        prop_assert!(policy.compute_fee(FeeKind::Transfer, amount, None).unwrap() >= policy.transfer_minimum);
        prop_assert!(policy.compute_fee(FeeKind::BillPayment, amount, None).unwrap() >= policy.bill_minimum);
    }

    /// Fees are monotonic in the amount.
    #[test]
    fn prop_fee_monotonic(a in amount(), b in amount()) {
        let policy = FeePolicy::default();
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        for kind in [FeeKind::Transfer, FeeKind::MerchantPayment, FeeKind::BillPayment, FeeKind::Deposit] {
            let f_lo = policy.compute_fee(kind, Money::from_minor(lo), None).unwrap();
            let f_hi = policy.compute_fee(kind, Money::from_minor(hi), None).unwrap();
            prop_assert!(f_lo <= f_hi);
        }
    }
}
