//! Settlement decisions.
//!
//! Pure functions that turn a gateway answer into what the store must do
//! with the pending or processing transaction.

use campuspay_shared::types::Money;
use serde::Serialize;

use super::gateway::{ChargeVerification, GatewayStatus, PayoutResult};
use crate::error::{WalletError, WalletResult};
use crate::fees::{FeeKind, FeePolicy};
use crate::holds::HoldReason;
use crate::wallet::TransactionKind;

/// What to do with a pending funding transaction after verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FundingDecision {
    /// Apply the credit.
    Credit,
    /// Close the transaction as failed.
    Fail {
        /// Stored failure reason.
        reason: String,
    },
    /// Leave it pending; the payer has not finished.
    StillPending,
}

/// Decides the outcome of a funding verification.
///
/// A successful charge for a different amount than recorded fails the
/// transaction instead of crediting either value.
#[must_use]
pub fn decide_funding(recorded_amount: Money, verification: &ChargeVerification) -> FundingDecision {
    match verification.status {
        GatewayStatus::Success if verification.amount == recorded_amount => FundingDecision::Credit,
        GatewayStatus::Success => FundingDecision::Fail {
            reason: format!(
                "amount mismatch: expected {recorded_amount}, gateway reported {}",
                verification.amount
            ),
        },
        GatewayStatus::Failed => FundingDecision::Fail {
            reason: verification
                .message
                .clone()
                .unwrap_or_else(|| "charge failed".to_string()),
        },
        GatewayStatus::Pending => FundingDecision::StillPending,
    }
}

/// What to do with a processing payout after a gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayoutDecision {
    /// Release the hold and apply the debit.
    Settle {
        /// Provider reference to store.
        provider_reference: Option<String>,
    },
    /// Release the hold and close the transaction as failed.
    Fail {
        /// Stored failure reason.
        reason: String,
    },
    /// Still in flight; poll again on the next pass.
    InFlight,
}

/// Decides the outcome of a payout call.
#[must_use]
pub fn decide_payout(result: &PayoutResult) -> PayoutDecision {
    match result.status {
        GatewayStatus::Success => PayoutDecision::Settle {
            provider_reference: result.provider_reference.clone(),
        },
        GatewayStatus::Failed => PayoutDecision::Fail {
            reason: result
                .message
                .clone()
                .unwrap_or_else(|| "payout failed".to_string()),
        },
        GatewayStatus::Pending => PayoutDecision::InFlight,
    }
}

/// Amounts of a withdrawal or bill payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PayoutPlan {
    /// Amount leaving the platform.
    pub amount: Money,
    /// Fee credited to the fee sink.
    pub fee: Money,
    /// Hold placed until settlement: amount + fee.
    pub hold_amount: Money,
    /// Kind of the debit row.
    pub kind: TransactionKind,
}

impl PayoutPlan {
    /// Computes the plan for a payout of `amount`.
    pub fn new(reason: HoldReason, amount: Money, fees: &FeePolicy) -> WalletResult<Self> {
        let (fee_kind, kind) = match reason {
            HoldReason::Withdrawal => (FeeKind::Withdrawal, TransactionKind::Withdrawal),
            HoldReason::BillPayment => (FeeKind::BillPayment, TransactionKind::Payment),
        };
        let fee = fees.compute_fee(fee_kind, amount, None)?;
        let hold_amount = amount
            .checked_add(fee)
            .ok_or_else(|| WalletError::InvalidAmount("amount out of range".to_string()))?;
        Ok(Self {
            amount,
            fee,
            hold_amount,
            kind,
        })
    }

    /// Signed amount stored on the debit row; with the fee its net is
    /// `-(amount + fee)`.
    #[must_use]
    pub fn debit_amount(&self) -> Money {
        -self.amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verification(status: GatewayStatus, amount: i64) -> ChargeVerification {
        ChargeVerification {
            status,
            channel: Some("card".to_string()),
            amount: Money::from_minor(amount),
            message: None,
            raw: serde_json::json!({}),
        }
    }

    #[test]
    fn test_funding_success() {
        let v = verification(GatewayStatus::Success, 10_000);
        assert_eq!(decide_funding(Money::from_minor(10_000), &v), FundingDecision::Credit);
    }

    #[test]
    fn test_funding_amount_mismatch_fails() {
        let v = verification(GatewayStatus::Success, 9_000);
        assert!(matches!(
            decide_funding(Money::from_minor(10_000), &v),
            FundingDecision::Fail { reason } if reason.contains("mismatch")
        ));
    }

    #[test]
    fn test_funding_failure_keeps_gateway_reason() {
        let mut v = verification(GatewayStatus::Failed, 10_000);
        v.message = Some("Declined".to_string());
        assert_eq!(
            decide_funding(Money::from_minor(10_000), &v),
            FundingDecision::Fail {
                reason: "Declined".to_string()
            }
        );
    }

    #[test]
    fn test_funding_pending() {
        let v = verification(GatewayStatus::Pending, 10_000);
        assert_eq!(decide_funding(Money::from_minor(10_000), &v), FundingDecision::StillPending);
    }

    #[test]
    fn test_payout_decisions() {
        let ok = PayoutResult {
            status: GatewayStatus::Success,
            provider_reference: Some("PV-1".to_string()),
            message: None,
        };
        assert_eq!(
            decide_payout(&ok),
            PayoutDecision::Settle {
                provider_reference: Some("PV-1".to_string())
            }
        );
        let pending = PayoutResult {
            status: GatewayStatus::Pending,
            ..ok
        };
        assert_eq!(decide_payout(&pending), PayoutDecision::InFlight);
    }

    #[test]
    fn test_withdrawal_plan() {
        // 2000 + flat 1500
        let plan = PayoutPlan::new(HoldReason::Withdrawal, Money::from_minor(2_000), &FeePolicy::default()).unwrap();
        assert_eq!(plan.fee, Money::from_minor(1_500));
        assert_eq!(plan.hold_amount, Money::from_minor(3_500));
        assert_eq!(plan.kind, TransactionKind::Withdrawal);
        assert_eq!(plan.debit_amount() - plan.fee, Money::from_minor(-3_500));
    }

    #[test]
    fn test_bill_plan() {
        let plan = PayoutPlan::new(HoldReason::BillPayment, Money::from_minor(100_000), &FeePolicy::default()).unwrap();
        assert_eq!(plan.fee, Money::from_minor(1_500));
        assert_eq!(plan.kind, TransactionKind::Payment);
    }
}
