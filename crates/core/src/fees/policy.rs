//! Fee policy per operation kind.

use campuspay_shared::config::FeeConfig;
use campuspay_shared::types::Money;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::{WalletError, WalletResult};

/// Operation a fee is charged for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeKind {
    /// Peer-to-peer transfer: max(minimum, amount x rate).
    Transfer,
    /// Merchant payment: amount x merchant rate.
    MerchantPayment,
    /// Bill payment: max(minimum, amount x rate).
    BillPayment,
    /// Withdrawal: flat fee.
    Withdrawal,
    /// Funding: percentage deducted from the credited amount.
    Deposit,
}

/// Fee schedule with rates as percentages (`0.5` = 0.5%).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeePolicy {
    /// Transfer rate.
    pub transfer_rate: Decimal,
    /// Transfer minimum.
    pub transfer_minimum: Money,
    /// Default merchant rate.
    pub merchant_rate: Decimal,
    /// Bill payment rate.
    pub bill_rate: Decimal,
    /// Bill payment minimum.
    pub bill_minimum: Money,
    /// Flat withdrawal fee.
    pub withdrawal_flat: Money,
    /// Deposit rate.
    pub deposit_rate: Decimal,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self::from(&FeeConfig::default())
    }
}

impl From<&FeeConfig> for FeePolicy {
    fn from(config: &FeeConfig) -> Self {
        Self {
            transfer_rate: config.transfer_rate,
            transfer_minimum: Money::from_minor(config.transfer_minimum),
            merchant_rate: config.merchant_rate,
            bill_rate: config.bill_rate,
            bill_minimum: Money::from_minor(config.bill_minimum),
            withdrawal_flat: Money::from_minor(config.withdrawal_flat),
            deposit_rate: config.deposit_rate,
        }
    }
}

/// Converts basis points to a percentage rate (150 bps = 1.5%).
#[must_use]
pub fn bps_to_rate(bps: u32) -> Decimal {
    Decimal::new(i64::from(bps), 2)
}

impl FeePolicy {
    /// Computes the fee for `amount` (positive, minor units).
    ///
    /// `override_rate` replaces the rate of a merchant payment; other kinds
    /// ignore it.
    pub fn compute_fee(
        &self,
        kind: FeeKind,
        amount: Money,
        override_rate: Option<Decimal>,
    ) -> WalletResult<Money> {
        if !amount.is_positive() {
            return Err(WalletError::InvalidAmount(
                "amount must be positive".to_string(),
            ));
        }
        let pct = |rate: Decimal| {
            amount
                .percent(rate)
                .ok_or_else(|| WalletError::InvalidAmount("amount out of range".to_string()))
        };
        let fee = match kind {
            FeeKind::Transfer => pct(self.transfer_rate)?.max(self.transfer_minimum),
            FeeKind::MerchantPayment => pct(override_rate.unwrap_or(self.merchant_rate))?,
            FeeKind::BillPayment => pct(self.bill_rate)?.max(self.bill_minimum),
            FeeKind::Withdrawal => self.withdrawal_flat,
            FeeKind::Deposit => pct(self.deposit_rate)?,
        };
        if fee.is_negative() {
            return Err(WalletError::InvariantViolation(format!(
                "negative {kind:?} fee {fee}"
            )));
        }
        Ok(fee)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    // 0.5% of 5000 is 25, below the 100 minimum
    #[case(FeeKind::Transfer, 5_000, 100)]
    #[case(FeeKind::Transfer, 100_000, 500)]
    // 0.5% of 20_100 is 100.5, rounds up
    #[case(FeeKind::Transfer, 20_100, 101)]
    #[case(FeeKind::MerchantPayment, 10_000, 100)]
    // 1% of 50 is 0.5, rounds up
    #[case(FeeKind::MerchantPayment, 50, 1)]
    #[case(FeeKind::MerchantPayment, 49, 0)]
    #[case(FeeKind::BillPayment, 1_000, 200)]
    #[case(FeeKind::BillPayment, 100_000, 1_500)]
    #[case(FeeKind::Withdrawal, 2_000, 1_500)]
    #[case(FeeKind::Withdrawal, 1, 1_500)]
    #[case(FeeKind::Deposit, 10_000, 150)]
    // 1.5% of 100 is 1.5, rounds up
    #[case(FeeKind::Deposit, 100, 2)]
    fn test_default_schedule(#[case] kind: FeeKind, #[case] amount: i64, #[case] expected: i64) {
        let fee = FeePolicy::default()
            .compute_fee(kind, Money::from_minor(amount), None)
            .unwrap();
        assert_eq!(fee, Money::from_minor(expected));
    }

    #[test]
    fn test_merchant_override() {
        let policy = FeePolicy::default();
        let fee = policy
            .compute_fee(
                FeeKind::MerchantPayment,
                Money::from_minor(10_000),
                Some(bps_to_rate(250)),
            )
            .unwrap();
        assert_eq!(fee, Money::from_minor(250));
    }

    #[test]
    fn test_override_ignored_for_transfers() {
        let policy = FeePolicy::default();
        let fee = policy
            .compute_fee(FeeKind::Transfer, Money::from_minor(5_000), Some(dec!(50)))
            .unwrap();
        assert_eq!(fee, Money::from_minor(100));
    }

    #[test]
    fn test_bps_to_rate() {
        assert_eq!(bps_to_rate(100), dec!(1));
        assert_eq!(bps_to_rate(150), dec!(1.5));
        assert_eq!(bps_to_rate(0), Decimal::ZERO);
    }

    #[rstest]
    #[case(0)]
    #[case(-100)]
    fn test_rejects_non_positive_amount(#[case] amount: i64) {
        let result = FeePolicy::default().compute_fee(FeeKind::Transfer, Money::from_minor(amount), None);
        assert!(matches!(result, Err(WalletError::InvalidAmount(_))));
    }

    #[test]
    fn test_from_config() {
        let config = FeeConfig {
            transfer_rate: dec!(1),
            transfer_minimum: 10,
            ..FeeConfig::default()
        };
        let policy = FeePolicy::from(&config);
        let fee = policy
            .compute_fee(FeeKind::Transfer, Money::from_minor(5_000), None)
            .unwrap();
        assert_eq!(fee, Money::from_minor(50));
    }
}
