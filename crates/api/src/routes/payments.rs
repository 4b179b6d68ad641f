//! Money movement routes: funding, transfers, merchant payments, bills and
//! withdrawals.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use campuspay_core::settlement::PayoutDestination;
use campuspay_core::transfer::RecipientSelector;
use campuspay_db::repositories::{FundingCommand, PayoutCommand, TransferCommand};
use campuspay_shared::types::{MerchantId, Money, UserId};
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, error::ApiError, middleware::AuthUser};

/// Creates the payment routes (requires auth middleware to be applied externally).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/wallet/fund", post(fund_wallet))
        .route("/wallet/fund/{reference}/verify", post(verify_funding))
        .route("/transfers", post(transfer))
        .route("/payments/merchant", post(pay_merchant))
        .route("/payments/bill", post(pay_bill))
        .route("/withdrawals", post(withdraw))
}

/// Request body for funding a wallet.
#[derive(Debug, Deserialize)]
pub struct FundRequest {
    /// Amount charged, in minor units.
    pub amount: Money,
    /// Payer e-mail forwarded to the gateway.
    pub email: String,
    /// Client reference (`FND-...`); generated when absent.
    pub reference: Option<String>,
}

/// Request body for a transfer. Exactly one recipient field must be set.
#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    /// Recipient owner id.
    pub recipient_id: Option<Uuid>,
    /// Recipient contact handle.
    pub handle: Option<String>,
    /// Recipient merchant id.
    pub merchant_id: Option<Uuid>,
    /// Amount debited, in minor units.
    pub amount: Money,
    /// Wallet PIN.
    pub pin: String,
    /// Client reference; generated when absent.
    pub reference: Option<String>,
    /// Free-text note.
    pub description: Option<String>,
}

impl TransferRequest {
    fn selector(&self) -> Result<RecipientSelector, ApiError> {
        match (&self.recipient_id, &self.handle, &self.merchant_id) {
            (Some(id), None, None) => Ok(RecipientSelector::UserId(UserId::from_uuid(*id))),
            (None, Some(handle), None) => Ok(RecipientSelector::Handle(handle.clone())),
            (None, None, Some(id)) => Ok(RecipientSelector::Merchant(MerchantId::from_uuid(*id))),
            _ => Err(ApiError::BadRequest(
                "set exactly one of recipient_id, handle or merchant_id".to_string(),
            )),
        }
    }

    fn into_command(self, sender: UserId) -> Result<TransferCommand, ApiError> {
        Ok(TransferCommand {
            recipient: self.selector()?,
            sender,
            pin: self.pin,
            amount: self.amount,
            reference: self.reference,
            description: self.description,
        })
    }
}

/// Request body for a merchant payment.
#[derive(Debug, Deserialize)]
pub struct MerchantPaymentRequest {
    /// Merchant id.
    pub merchant_id: Uuid,
    /// Amount debited, in minor units.
    pub amount: Money,
    /// Wallet PIN.
    pub pin: String,
    /// Client reference; generated when absent.
    pub reference: Option<String>,
    /// Free-text note.
    pub description: Option<String>,
}

/// Request body for a withdrawal or bill payment.
#[derive(Debug, Deserialize)]
pub struct PayoutRequestBody {
    /// Amount paid out, in minor units (fee excluded).
    pub amount: Money,
    /// Wallet PIN.
    pub pin: String,
    /// Bank account or biller.
    pub destination: PayoutDestination,
    /// Client reference; generated when absent.
    pub reference: Option<String>,
    /// Free-text note.
    pub description: Option<String>,
}

impl PayoutRequestBody {
    fn into_command(self, owner: UserId) -> PayoutCommand {
        PayoutCommand {
            owner,
            pin: self.pin,
            amount: self.amount,
            destination: self.destination,
            reference: self.reference,
            description: self.description,
        }
    }
}

/// POST `/wallet/fund` - Start a gateway charge.
async fn fund_wallet(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<FundRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let init = state
        .settlement
        .initialize_funding(FundingCommand {
            owner: auth.owner(),
            amount: req.amount,
            email: req.email,
            reference: req.reference,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(init)))
}

/// POST `/wallet/fund/{reference}/verify` - Verify a charge and credit once.
async fn verify_funding(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(reference): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let transaction = state
        .settlement
        .verify_funding(auth.owner(), &reference)
        .await?;
    Ok((StatusCode::OK, Json(transaction)))
}

/// POST `/transfers` - Pay a student or merchant wallet.
async fn transfer(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<TransferRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let receipt = state
        .transfers
        .transfer(req.into_command(auth.owner())?)
        .await?;
    Ok((receipt_status(receipt.replayed), Json(receipt)))
}

/// POST `/payments/merchant` - Pay a merchant.
async fn pay_merchant(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<MerchantPaymentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let receipt = state
        .transfers
        .pay_merchant(TransferCommand {
            sender: auth.owner(),
            pin: req.pin,
            recipient: RecipientSelector::Merchant(MerchantId::from_uuid(req.merchant_id)),
            amount: req.amount,
            reference: req.reference,
            description: req.description,
        })
        .await?;
    Ok((receipt_status(receipt.replayed), Json(receipt)))
}

/// POST `/payments/bill` - Hold funds and queue a bill payment.
async fn pay_bill(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<PayoutRequestBody>,
) -> Result<impl IntoResponse, ApiError> {
    let receipt = state
        .settlement
        .pay_bill(req.into_command(auth.owner()))
        .await?;
    Ok((StatusCode::ACCEPTED, Json(receipt)))
}

/// POST `/withdrawals` - Hold funds and queue a bank withdrawal.
async fn withdraw(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<PayoutRequestBody>,
) -> Result<impl IntoResponse, ApiError> {
    let receipt = state
        .settlement
        .withdraw(req.into_command(auth.owner()))
        .await?;
    Ok((StatusCode::ACCEPTED, Json(receipt)))
}

/// 201 for a new transfer, 200 when the reference replayed.
pub(crate) fn receipt_status(replayed: bool) -> StatusCode {
    if replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    }
}
