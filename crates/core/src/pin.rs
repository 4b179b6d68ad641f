//! Wallet PIN hashing with Argon2id.
//!
//! PINs are 4-6 ASCII digits. Only the salted PHC hash is ever stored;
//! verification goes through argon2's constant-time comparison.

use argon2::{
    Argon2, PasswordHash,
    password_hash::{PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use thiserror::Error;

use crate::error::WalletError;

/// Minimum PIN length in digits.
pub const PIN_MIN_LEN: usize = 4;

/// Maximum PIN length in digits.
pub const PIN_MAX_LEN: usize = 6;

/// Errors that can occur during PIN operations.
#[derive(Debug, Error)]
pub enum PinError {
    /// PIN is not 4-6 digits.
    #[error("PIN must be {PIN_MIN_LEN}-{PIN_MAX_LEN} digits")]
    InvalidFormat,

    /// Failed to hash PIN.
    #[error("failed to hash PIN: {0}")]
    HashError(String),

    /// Failed to verify PIN.
    #[error("failed to verify PIN: {0}")]
    VerifyError(String),

    /// Stored hash is not a valid PHC string.
    #[error("invalid PIN hash format")]
    InvalidHash,
}

impl From<PinError> for WalletError {
    fn from(err: PinError) -> Self {
        match err {
            PinError::InvalidFormat => Self::InvalidRequest(err.to_string()),
            PinError::HashError(_) | PinError::VerifyError(_) | PinError::InvalidHash => {
                Self::Internal(err.to_string())
            }
        }
    }
}

/// Checks that a PIN is 4-6 ASCII digits.
pub fn validate_pin_format(pin: &str) -> Result<(), PinError> {
    let len_ok = (PIN_MIN_LEN..=PIN_MAX_LEN).contains(&pin.len());
    if len_ok && pin.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(PinError::InvalidFormat)
    }
}

/// Validates and hashes a PIN, returning the PHC string.
///
/// # Example
///
/// ```
/// use campuspay_core::pin::hash_pin;
///
/// let hash = hash_pin("1234").unwrap();
/// assert!(hash.starts_with("$argon2id$"));
/// ```
pub fn hash_pin(pin: &str) -> Result<String, PinError> {
    validate_pin_format(pin)?;
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(pin.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PinError::HashError(e.to_string()))
}

/// Verifies a PIN against a stored hash.
///
/// Returns `Ok(false)` on mismatch; errors only when the stored hash is
/// unusable.
pub fn verify_pin(pin: &str, hash: &str) -> Result<bool, PinError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| PinError::InvalidHash)?;

    match Argon2::default().verify_password(pin.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PinError::VerifyError(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1234", true)]
    #[case("123456", true)]
    #[case("123", false)]
    #[case("1234567", false)]
    #[case("12a4", false)]
    #[case("", false)]
    #[case("١٢٣٤", false)]
    fn test_pin_format(#[case] pin: &str, #[case] valid: bool) {
        assert_eq!(validate_pin_format(pin).is_ok(), valid);
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_pin("4821").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_pin("4821", &hash).unwrap());
        assert!(!verify_pin("4822", &hash).unwrap());
    }

    #[test]
    fn test_same_pin_different_hashes() {
        let a = hash_pin("0000").unwrap();
        let b = hash_pin("0000").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_rejects_bad_format() {
        assert!(matches!(hash_pin("12"), Err(PinError::InvalidFormat)));
    }

    #[test]
    fn test_invalid_hash_format() {
        let result = verify_pin("1234", "not-a-hash");
        assert!(matches!(result, Err(PinError::InvalidHash)));
    }

    #[test]
    fn test_format_error_maps_to_invalid_request() {
        let err: WalletError = PinError::InvalidFormat.into();
        assert_eq!(err.error_code(), "INVALID_REQUEST");
    }
}
