//! QR payment routes.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use campuspay_core::WalletError;
use campuspay_core::qr::{QrPayment, QrRecipient};
use campuspay_shared::types::{MerchantId, Money};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::payments::receipt_status;
use crate::{AppState, error::ApiError, middleware::AuthUser};

/// Creates the QR routes (requires auth middleware to be applied externally).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/qr", post(generate_qr))
        .route("/qr/scan", post(scan_qr))
        .route("/qr/pay", post(pay_qr))
}

/// Request body for generating a code.
#[derive(Debug, Deserialize)]
pub struct GenerateQrRequest {
    /// Fixed amount; omit for an open-amount code.
    pub amount: Option<Money>,
    /// Shown to the payer.
    pub description: Option<String>,
    /// Pay the caller's merchant profile instead of their personal wallet.
    #[serde(default)]
    pub as_merchant: bool,
}

/// Generated code.
#[derive(Debug, Serialize)]
pub struct QrResponse {
    /// Payload to render as a QR image.
    pub payload: String,
    /// Reference the payment will carry.
    pub reference: String,
    /// Expiry.
    pub expires_at: DateTime<Utc>,
}

/// Request body for scanning a code.
#[derive(Debug, Deserialize)]
pub struct ScanQrRequest {
    /// Scanned payload.
    pub payload: String,
}

/// Request body for paying a code.
#[derive(Debug, Deserialize)]
pub struct PayQrRequest {
    /// Scanned payload.
    pub payload: String,
    /// Amount for open-amount codes; must match a fixed amount if given.
    pub amount: Option<Money>,
    /// Wallet PIN.
    pub pin: String,
}

/// POST `/qr` - Generate a payment code for the caller.
async fn generate_qr(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<GenerateQrRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.amount.is_some_and(|amount| !amount.is_positive()) {
        return Err(WalletError::InvalidAmount("amount must be positive".to_string()).into());
    }

    let recipient = if req.as_merchant {
        let merchant = state
            .merchants
            .find_by_owner(auth.owner())
            .await?
            .ok_or_else(|| {
                WalletError::MerchantNotFound(format!("no merchant profile for {}", auth.owner()))
            })?;
        QrRecipient::Merchant {
            merchant_id: MerchantId::from_uuid(merchant.id),
        }
    } else {
        // The code is useless without a wallet to receive into.
        state.wallets.get_wallet(auth.owner()).await?;
        QrRecipient::User {
            user_id: auth.owner(),
        }
    };

    let validity =
        Duration::seconds(i64::try_from(state.ledger.qr_validity_secs).unwrap_or(i64::MAX));
    let qr = QrPayment::new(recipient, req.amount, req.description, Utc::now(), validity);
    let payload = qr.encode().map_err(WalletError::from)?;

    Ok((
        StatusCode::CREATED,
        Json(QrResponse {
            payload,
            reference: qr.base_reference(),
            expires_at: qr.expires_at,
        }),
    ))
}

/// POST `/qr/scan` - Decode a code so the payer can confirm it.
async fn scan_qr(
    _auth: AuthUser,
    Json(req): Json<ScanQrRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let qr = QrPayment::scan(&req.payload, Utc::now()).map_err(WalletError::from)?;
    Ok((StatusCode::OK, Json(qr)))
}

/// POST `/qr/pay` - Pay a scanned code.
async fn pay_qr(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<PayQrRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let receipt = state
        .transfers
        .pay_qr(auth.owner(), req.pin, &req.payload, req.amount, Utc::now())
        .await?;
    Ok((receipt_status(receipt.replayed), Json(receipt)))
}
