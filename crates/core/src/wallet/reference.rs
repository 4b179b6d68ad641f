//! Transaction references (idempotency keys).
//!
//! A base reference identifies one logical operation. Multi-leg operations
//! derive one deterministic sub-reference per leg, so a retry with the same
//! base reference collides with the legs already written.

use uuid::Uuid;

use crate::error::{WalletError, WalletResult};

/// Maximum length of a caller-supplied base reference.
pub const MAX_BASE_REFERENCE_LEN: usize = 60;

/// Reference prefix per operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferencePrefix {
    /// Wallet funding.
    Funding,
    /// Peer transfer.
    Transfer,
    /// Merchant payment.
    Merchant,
    /// Bill payment.
    Bill,
    /// Withdrawal.
    Withdrawal,
}

impl ReferencePrefix {
    fn as_str(self) -> &'static str {
        match self {
            Self::Funding => "FND",
            Self::Transfer => "TRF",
            Self::Merchant => "MRC",
            Self::Bill => "BIL",
            Self::Withdrawal => "WDR",
        }
    }
}

/// Leg of a multi-row operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leg {
    /// Debit of the paying wallet.
    Debit,
    /// Credit of the receiving wallet.
    Credit,
    /// Credit of the fee-sink wallet.
    Fee,
    /// Hold placed for an external payout.
    Hold,
}

impl Leg {
    fn suffix(self) -> &'static str {
        match self {
            Self::Debit => "D",
            Self::Credit => "C",
            Self::Fee => "F",
            Self::Hold => "H",
        }
    }
}

/// Generates a fresh base reference, e.g. `TRF-0192F0C4...`.
#[must_use]
pub fn generate(prefix: ReferencePrefix) -> String {
    format!(
        "{}-{}",
        prefix.as_str(),
        Uuid::now_v7().simple().to_string().to_uppercase()
    )
}

/// Derives the reference of one leg from a base reference.
#[must_use]
pub fn leg_reference(base: &str, leg: Leg) -> String {
    format!("{base}-{}", leg.suffix())
}

/// Validates a caller-supplied base reference.
///
/// Allowed: 1-60 characters of ASCII letters, digits, `-` and `_`.
pub fn validate_reference(reference: &str) -> WalletResult<()> {
    if reference.is_empty() || reference.len() > MAX_BASE_REFERENCE_LEN {
        return Err(WalletError::InvalidRequest(format!(
            "reference must be 1-{MAX_BASE_REFERENCE_LEN} characters"
        )));
    }
    if !reference
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    {
        return Err(WalletError::InvalidRequest(
            "reference may only contain letters, digits, '-' and '_'".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_references_are_unique_and_valid() {
        let a = generate(ReferencePrefix::Transfer);
        let b = generate(ReferencePrefix::Transfer);
        assert_ne!(a, b);
        assert!(a.starts_with("TRF-"));
        assert!(validate_reference(&a).is_ok());
    }

    #[test]
    fn test_leg_references_are_distinct() {
        let base = "TRF-ABC";
        let legs = [Leg::Debit, Leg::Credit, Leg::Fee, Leg::Hold].map(|l| leg_reference(base, l));
        assert_eq!(legs, ["TRF-ABC-D", "TRF-ABC-C", "TRF-ABC-F", "TRF-ABC-H"]);
    }

    #[test]
    fn test_validate_reference() {
        assert!(validate_reference("order_42-a").is_ok());
        assert!(validate_reference("").is_err());
        assert!(validate_reference("has space").is_err());
        assert!(validate_reference(&"x".repeat(61)).is_err());
        assert!(validate_reference(&"x".repeat(60)).is_ok());
    }
}
