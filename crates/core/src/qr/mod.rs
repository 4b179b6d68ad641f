//! QR payment payloads.
//!
//! A payload is `CPQR1.` followed by base64url-encoded JSON naming the
//! recipient, an optional fixed amount, a nonce and an expiry. Paying a QR
//! code runs the ordinary transfer path with `QR-{nonce}` as the base
//! reference, so paying the same code twice replays instead of charging
//! again.

use campuspay_shared::types::{MerchantId, Money, UserId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::error::WalletError;
use crate::transfer::RecipientSelector;

/// Version prefix of every payload.
pub const QR_PREFIX: &str = "CPQR1.";

/// Errors decoding or using a QR payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QrError {
    /// Not a Campuspay payload, or an unsupported version.
    #[error("unrecognized QR code")]
    UnknownFormat,

    /// Body is not valid base64url JSON.
    #[error("malformed QR payload: {0}")]
    Malformed(String),

    /// Past its expiry.
    #[error("QR code expired at {0}")]
    Expired(DateTime<Utc>),

    /// Open-amount code scanned without an amount, or a fixed-amount code
    /// paid with a different one.
    #[error("{0}")]
    AmountMismatch(String),
}

impl From<QrError> for WalletError {
    fn from(err: QrError) -> Self {
        match err {
            QrError::AmountMismatch(_) => Self::InvalidAmount(err.to_string()),
            _ => Self::InvalidRequest(err.to_string()),
        }
    }
}

/// Who a QR code pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QrRecipient {
    /// A student wallet.
    User {
        /// Owner id.
        user_id: UserId,
    },
    /// A merchant profile.
    Merchant {
        /// Merchant id.
        merchant_id: MerchantId,
    },
}

impl QrRecipient {
    /// Selector used to resolve the recipient wallet.
    #[must_use]
    pub fn selector(&self) -> RecipientSelector {
        match *self {
            Self::User { user_id } => RecipientSelector::UserId(user_id),
            Self::Merchant { merchant_id } => RecipientSelector::Merchant(merchant_id),
        }
    }
}

/// Decoded QR payment request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrPayment {
    /// Recipient.
    pub recipient: QrRecipient,
    /// Fixed amount; `None` lets the payer choose.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Money>,
    /// One-time nonce; the base reference of the payment.
    pub nonce: String,
    /// Description shown to the payer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Expiry.
    pub expires_at: DateTime<Utc>,
}

impl QrPayment {
    /// Creates a payment request valid for `validity` from `now`.
    #[must_use]
    pub fn new(
        recipient: QrRecipient,
        amount: Option<Money>,
        description: Option<String>,
        now: DateTime<Utc>,
        validity: Duration,
    ) -> Self {
        Self {
            recipient,
            amount,
            nonce: Uuid::new_v4().simple().to_string(),
            description,
            expires_at: now + validity,
        }
    }

    /// Encodes the payload string.
    pub fn encode(&self) -> Result<String, QrError> {
        let json = serde_json::to_vec(self).map_err(|e| QrError::Malformed(e.to_string()))?;
        Ok(format!("{QR_PREFIX}{}", base64_url::encode(&json)))
    }

    /// Decodes a payload string without checking expiry.
    pub fn decode(payload: &str) -> Result<Self, QrError> {
        let body = payload
            .trim()
            .strip_prefix(QR_PREFIX)
            .ok_or(QrError::UnknownFormat)?;
        let bytes = base64_url::decode(body).map_err(|e| QrError::Malformed(e.to_string()))?;
        let qr: Self = serde_json::from_slice(&bytes).map_err(|e| QrError::Malformed(e.to_string()))?;
        if qr.nonce.is_empty()
            || qr.nonce.len() > 40
            || !qr.nonce.bytes().all(|b| b.is_ascii_alphanumeric())
        {
            return Err(QrError::Malformed("invalid nonce".to_string()));
        }
        if qr.amount.is_some_and(|a| !a.is_positive()) {
            return Err(QrError::Malformed("amount must be positive".to_string()));
        }
        Ok(qr)
    }

    /// Decodes and rejects expired payloads.
    pub fn scan(payload: &str, now: DateTime<Utc>) -> Result<Self, QrError> {
        let qr = Self::decode(payload)?;
        if qr.expires_at <= now {
            return Err(QrError::Expired(qr.expires_at));
        }
        Ok(qr)
    }

    /// Base reference of the payment.
    #[must_use]
    pub fn base_reference(&self) -> String {
        format!("QR-{}", self.nonce)
    }

    /// Amount to pay, reconciling the embedded and payer-supplied amounts.
    pub fn resolve_amount(&self, supplied: Option<Money>) -> Result<Money, QrError> {
        match (self.amount, supplied) {
            (Some(fixed), None) => Ok(fixed),
            (Some(fixed), Some(given)) if fixed == given => Ok(fixed),
            (Some(fixed), Some(given)) => Err(QrError::AmountMismatch(format!(
                "this code is for {fixed}, not {given}"
            ))),
            (None, Some(given)) => Ok(given),
            (None, None) => Err(QrError::AmountMismatch(
                "this code needs an amount".to_string(),
            )),
        }
    }
}
