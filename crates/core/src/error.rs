//! Wallet ledger error taxonomy.
//!
//! Every failure path of a ledger operation maps to exactly one variant with
//! a specific, user-actionable message. Validation failures leave no partial
//! state behind; `InvariantViolation` marks a bug and aborts the enclosing
//! unit of work.

use campuspay_shared::types::Money;
use serde::Serialize;
use thiserror::Error;

/// Result type alias using `WalletError`.
pub type WalletResult<T> = Result<T, WalletError>;

/// Spend window a limit applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitWindow {
    /// Calendar day in the wallet's timezone.
    Daily,
    /// Calendar month in the wallet's timezone.
    Monthly,
}

impl std::fmt::Display for LimitWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Daily => f.write_str("daily"),
            Self::Monthly => f.write_str("monthly"),
        }
    }
}

/// Errors that can occur during wallet ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    // ========== Lookup Errors ==========
    /// No wallet for the owner or id.
    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    /// Transfer recipient could not be resolved.
    #[error("Recipient not found: {0}")]
    RecipientNotFound(String),

    /// No hold with the given reference.
    #[error("Hold not found: {0}")]
    HoldNotFound(String),

    /// No transaction with the given reference.
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// No merchant profile with the given id.
    #[error("Merchant not found: {0}")]
    MerchantNotFound(String),

    /// The resource already exists (duplicate wallet or merchant).
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    // ========== Credential Errors ==========
    /// PIN did not match.
    #[error("Invalid PIN")]
    InvalidCredential,

    /// Too many failed PIN attempts.
    #[error("Too many failed PIN attempts, try again in {retry_after_secs} seconds")]
    PinLocked {
        /// Seconds until the lockout window elapses.
        retry_after_secs: u64,
    },

    // ========== Balance and Limit Errors ==========
    /// The debit would drive the available balance negative.
    #[error("Insufficient balance: available {available}, required {required}")]
    InsufficientFunds {
        /// Available balance before the operation.
        available: Money,
        /// Amount the operation needs.
        required: Money,
    },

    /// A daily or monthly spend cap would be exceeded.
    #[error("{window} limit exceeded: spent {spent} of {cap}, requested {requested}")]
    LimitExceeded {
        /// Which window.
        window: LimitWindow,
        /// Configured cap.
        cap: Money,
        /// Already spent in the window.
        spent: Money,
        /// Requested amount.
        requested: Money,
    },

    // ========== Request Errors ==========
    /// Recipient is not eligible (self-transfer, inactive, unverified).
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    /// Reference reused with different parameters, or for a closed transaction.
    #[error("Duplicate reference: {0}")]
    DuplicateReference(String),

    /// Amount is zero, has the wrong sign, or does not cover the fee.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Malformed input (PIN format, reference format, QR payload).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The wallet is deactivated.
    #[error("Wallet is inactive: {0}")]
    WalletInactive(String),

    /// The transaction cannot move to the requested status.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: String,
        /// Requested status.
        to: String,
    },

    // ========== Gateway Errors ==========
    /// The payment provider rejected or failed the call.
    #[error("Payment gateway error: {0}")]
    Gateway(String),

    /// The payment provider did not answer in time; outcome unknown.
    #[error("Payment gateway timed out for {0}; the transaction is flagged for reconciliation")]
    GatewayTimeout(String),

    // ========== Concurrency Errors ==========
    /// Optimistic version check failed.
    #[error("Concurrent modification detected, please retry")]
    ConcurrentModification,

    // ========== Internal Errors ==========
    /// Ledger math or state would break an invariant. Always a bug.
    #[error("Ledger invariant violated: {0}")]
    InvariantViolation(String),

    /// Internal error unrelated to ledger state.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl WalletError {
    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::WalletNotFound(_) => "WALLET_NOT_FOUND",
            Self::RecipientNotFound(_) => "RECIPIENT_NOT_FOUND",
            Self::HoldNotFound(_) => "HOLD_NOT_FOUND",
            Self::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
            Self::MerchantNotFound(_) => "MERCHANT_NOT_FOUND",
            Self::AlreadyExists(_) => "ALREADY_EXISTS",
            Self::InvalidCredential => "INVALID_PIN",
            Self::PinLocked { .. } => "PIN_LOCKED",
            Self::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Self::LimitExceeded {
                window: LimitWindow::Daily,
                ..
            } => "DAILY_LIMIT_EXCEEDED",
            Self::LimitExceeded {
                window: LimitWindow::Monthly,
                ..
            } => "MONTHLY_LIMIT_EXCEEDED",
            Self::InvalidRecipient(_) => "INVALID_RECIPIENT",
            Self::DuplicateReference(_) => "DUPLICATE_REFERENCE",
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::WalletInactive(_) => "WALLET_INACTIVE",
            Self::InvalidTransition { .. } => "INVALID_STATUS_TRANSITION",
            Self::Gateway(_) => "GATEWAY_ERROR",
            Self::GatewayTimeout(_) => "GATEWAY_TIMEOUT",
            Self::ConcurrentModification => "CONCURRENT_MODIFICATION",
            Self::InvariantViolation(_) => "INVARIANT_VIOLATION",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - malformed input
            Self::InvalidAmount(_) | Self::InvalidRequest(_) => 400,

            // 401 Unauthorized - credential mismatch
            Self::InvalidCredential => 401,

            // 404 Not Found
            Self::WalletNotFound(_)
            | Self::RecipientNotFound(_)
            | Self::HoldNotFound(_)
            | Self::TransactionNotFound(_)
            | Self::MerchantNotFound(_) => 404,

            // 409 Conflict
            Self::AlreadyExists(_)
            | Self::DuplicateReference(_)
            | Self::InvalidTransition { .. }
            | Self::ConcurrentModification => 409,

            // 422 Unprocessable - business rule rejections
            Self::InsufficientFunds { .. }
            | Self::LimitExceeded { .. }
            | Self::InvalidRecipient(_)
            | Self::WalletInactive(_) => 422,

            // 423 Locked
            Self::PinLocked { .. } => 423,

            // 502/504 upstream
            Self::Gateway(_) => 502,
            Self::GatewayTimeout(_) => 504,

            // 500 Internal Server Error
            Self::InvariantViolation(_) | Self::Internal(_) => 500,
        }
    }

    /// Returns true if the caller may retry with the same reference.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConcurrentModification | Self::Gateway(_) | Self::GatewayTimeout(_)
        )
    }

    /// Returns true if this error must reach operational alerting.
    #[must_use]
    pub fn is_alert(&self) -> bool {
        matches!(self, Self::InvariantViolation(_))
    }
}
