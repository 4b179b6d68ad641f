//! Payment gateway capability.
//!
//! The gateway initializes and verifies external charges (funding) and
//! initiates payouts (withdrawals, bill payments). Every call is keyed by the
//! ledger reference, so repeating a call with the same reference is safe.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use campuspay_shared::types::{Currency, Money};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::WalletError;

/// Request to start an external charge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChargeRequest {
    /// Ledger reference of the pending funding transaction.
    pub reference: String,
    /// Amount to charge.
    pub amount: Money,
    /// Currency of the charge.
    pub currency: Currency,
    /// Payer email for the provider's checkout.
    pub email: String,
    /// Free-form metadata forwarded to the provider.
    pub metadata: serde_json::Value,
}

/// Handle returned when a charge is initialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeInit {
    /// Opaque handle the payer uses to complete the charge (checkout URL or code).
    pub authorization_handle: String,
    /// Provider's own reference for the charge.
    pub external_reference: String,
}

/// Provider-side status of a charge or payout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayStatus {
    /// Money moved.
    Success,
    /// Provider declined or the payer abandoned.
    Failed,
    /// Not finished yet.
    Pending,
}

/// Result of verifying a charge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeVerification {
    /// Provider status.
    pub status: GatewayStatus,
    /// Payment channel reported by the provider (card, bank transfer, ...).
    pub channel: Option<String>,
    /// Amount the provider actually collected.
    pub amount: Money,
    /// Provider message, used as the failure reason.
    pub message: Option<String>,
    /// Raw provider payload, stored as transaction metadata.
    pub raw: serde_json::Value,
}

/// Where a payout goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PayoutDestination {
    /// Bank account withdrawal.
    BankAccount {
        /// Bank code.
        bank_code: String,
        /// Account number.
        account_number: String,
        /// Account holder name.
        account_name: String,
    },
    /// Bill payment.
    Biller {
        /// Biller code (utility, airtime, tuition, ...).
        biller_code: String,
        /// Customer identifier at the biller.
        customer_id: String,
    },
}

/// Request to move money out of the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayoutRequest {
    /// Ledger reference of the processing transaction.
    pub reference: String,
    /// Amount paid out (fee excluded).
    pub amount: Money,
    /// Currency of the payout.
    pub currency: Currency,
    /// Destination.
    pub destination: PayoutDestination,
}

/// Result of a payout call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutResult {
    /// Provider status.
    pub status: GatewayStatus,
    /// Provider's reference, when assigned.
    pub provider_reference: Option<String>,
    /// Provider message, used as the failure reason.
    pub message: Option<String>,
}

/// Errors returned by gateway calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// No answer within the call timeout. The outcome is unknown.
    #[error("gateway call for {0} timed out")]
    Timeout(String),

    /// The provider refused the request.
    #[error("gateway rejected request: {0}")]
    Rejected(String),

    /// The provider could not be reached.
    #[error("gateway unavailable: {0}")]
    Unavailable(String),

    /// The provider has no record of the reference.
    #[error("gateway has no record of {0}")]
    UnknownReference(String),
}

impl From<GatewayError> for WalletError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Timeout(reference) => Self::GatewayTimeout(reference),
            other => Self::Gateway(other.to_string()),
        }
    }
}

/// External payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Starts a charge the payer completes out-of-band.
    async fn initialize_charge(&self, request: &ChargeRequest) -> Result<ChargeInit, GatewayError>;

    /// Looks up the outcome of a charge by ledger reference.
    async fn verify_charge(&self, reference: &str) -> Result<ChargeVerification, GatewayError>;

    /// Initiates (or re-polls) a payout keyed by ledger reference.
    async fn initiate_payout(&self, request: &PayoutRequest) -> Result<PayoutResult, GatewayError>;
}

/// Bounds a gateway call by `limit`; expiry becomes `GatewayError::Timeout`.
pub async fn with_timeout<T, F>(limit: Duration, reference: &str, call: F) -> Result<T, GatewayError>
where
    F: Future<Output = Result<T, GatewayError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or_else(|_| Err(GatewayError::Timeout(reference.to_string())))
}
