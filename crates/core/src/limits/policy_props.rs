//! Property-based tests for the limit policy.

use campuspay_shared::types::Money;
use proptest::prelude::*;

use super::policy::{SpendCaps, SpendTotals, check_limits};

fn minor(max: i64) -> impl Strategy<Value = i64> {
    0i64..max
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// A request accepted at some spent level is also accepted at any lower
    /// spent level; a rejected one stays rejected at any higher level.
    #[test]
    fn prop_limit_monotonic_in_spend(
        daily_cap in minor(1_000_000),
        extra in minor(10_000_000),
        spent in minor(1_000_000),
        less in minor(1_000_000),
        requested in 1i64..1_000_000i64,
    ) {
        let caps = SpendCaps {
            daily: Money::from_minor(daily_cap),
            monthly: Money::from_minor(daily_cap + extra),
        };
        let high = SpendTotals { daily: Money::from_minor(spent), monthly: Money::from_minor(spent) };
        let low_spent = spent.saturating_sub(less).max(0);
        let low = SpendTotals { daily: Money::from_minor(low_spent), monthly: Money::from_minor(low_spent) };
        let requested = Money::from_minor(requested);

        if check_limits(&caps, &high, requested).is_ok() {
            prop_assert!(check_limits(&caps, &low, requested).is_ok());
        }
        if check_limits(&caps, &low, requested).is_err() {
            prop_assert!(check_limits(&caps, &high, requested).is_err());
        }
    }

    /// The check accepts exactly when both windows stay within their caps.
    #[test]
    fn prop_limit_matches_definition(
        daily_cap in minor(1_000_000),
        monthly_cap in minor(5_000_000),
        daily in minor(1_000_000),
        monthly in minor(5_000_000),
        requested in 1i64..1_000_000i64,
    ) {
        let caps = SpendCaps { daily: Money::from_minor(daily_cap), monthly: Money::from_minor(monthly_cap) };
        let spent = SpendTotals { daily: Money::from_minor(daily), monthly: Money::from_minor(monthly) };
        let ok = daily + requested <= daily_cap && monthly + requested <= monthly_cap;
        prop_assert_eq!(check_limits(&caps, &spent, Money::from_minor(requested)).is_ok(), ok);
    }
}
