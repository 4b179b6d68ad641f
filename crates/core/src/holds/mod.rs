//! Hold lifecycle rules.
//!
//! A hold reserves part of a wallet's available balance without touching the
//! ledger balance. It is released exactly once, either when its settlement
//! finishes or when the expiry sweep finds it past `expires_at`.

use campuspay_shared::types::Money;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{WalletError, WalletResult};

/// Why a hold was placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldReason {
    /// Pending external payout to a bank account.
    Withdrawal,
    /// Pending external bill payment.
    BillPayment,
}

impl HoldReason {
    /// Returns the string representation of the reason.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Withdrawal => "withdrawal",
            Self::BillPayment => "bill_payment",
        }
    }
}

impl fmt::Display for HoldReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a hold was released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseReason {
    /// Settlement succeeded; the debit replaces the hold.
    Settled,
    /// Settlement failed; funds return to available.
    Failed,
    /// Expired before any settlement report.
    Expired,
    /// Released by an operator before settlement.
    Cancelled,
}

impl ReleaseReason {
    /// Returns the string representation of the reason.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Settled => "settled",
            Self::Failed => "failed",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Observable state of a hold at an instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldState {
    /// Reserving funds.
    Active,
    /// Past expiry but not yet swept.
    Expired,
    /// Released; no longer reserving funds.
    Released,
}

impl HoldState {
    /// Derives the state from the stored timestamps.
    #[must_use]
    pub fn at(
        released_at: Option<DateTime<Utc>>,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        match released_at {
            Some(_) => Self::Released,
            None if expires_at < now => Self::Expired,
            None => Self::Active,
        }
    }

    /// True while the hold still reduces available balance.
    #[must_use]
    pub fn reserves_funds(&self) -> bool {
        !matches!(self, Self::Released)
    }
}

/// Validates a hold request and returns its expiry.
pub fn validate_hold(amount: Money, ttl: Duration, now: DateTime<Utc>) -> WalletResult<DateTime<Utc>> {
    if !amount.is_positive() {
        return Err(WalletError::InvalidAmount(
            "hold amount must be positive".to_string(),
        ));
    }
    if ttl <= Duration::zero() {
        return Err(WalletError::InvalidRequest(
            "hold ttl must be positive".to_string(),
        ));
    }
    now.checked_add_signed(ttl)
        .ok_or_else(|| WalletError::InvalidRequest("hold ttl out of range".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hold_state() {
        let now = Utc::now();
        let later = now + Duration::hours(1);
        let earlier = now - Duration::hours(1);
        assert_eq!(HoldState::at(None, later, now), HoldState::Active);
        assert_eq!(HoldState::at(None, earlier, now), HoldState::Expired);
        assert_eq!(HoldState::at(Some(earlier), earlier, now), HoldState::Released);
        // expires_at == now is not yet expired
        assert_eq!(HoldState::at(None, now, now), HoldState::Active);
    }

    #[test]
    fn test_expired_hold_still_reserves_until_swept() {
        assert!(HoldState::Expired.reserves_funds());
        assert!(!HoldState::Released.reserves_funds());
    }

    #[test]
    fn test_validate_hold() {
        let now = Utc::now();
        let expiry = validate_hold(Money::from_minor(2_500), Duration::seconds(60), now).unwrap();
        assert_eq!(expiry, now + Duration::seconds(60));

        assert!(validate_hold(Money::ZERO, Duration::seconds(60), now).is_err());
        assert!(validate_hold(Money::from_minor(1), Duration::zero(), now).is_err());
    }

    #[test]
    fn test_reason_strings() {
        assert_eq!(HoldReason::Withdrawal.to_string(), "withdrawal");
        assert_eq!(HoldReason::BillPayment.as_str(), "bill_payment");
        assert_eq!(ReleaseReason::Cancelled.as_str(), "cancelled");
    }
}
