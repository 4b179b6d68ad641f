//! Merchant profile routes.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use campuspay_db::repositories::RegisterMerchant;
use campuspay_shared::types::MerchantId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppState, error::ApiError, middleware::AuthUser};

/// Creates the merchant routes (requires auth middleware to be applied externally).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/merchants", post(register_merchant))
        .route("/merchants/{merchant_id}", get(get_merchant))
}

/// Request body for registering a merchant profile.
#[derive(Debug, Deserialize)]
pub struct RegisterMerchantRequest {
    /// Display name.
    pub business_name: String,
    /// Fee override in basis points.
    pub fee_bps: Option<u32>,
}

/// Public view of a merchant; what a payer sees before paying.
#[derive(Debug, Serialize)]
pub struct MerchantResponse {
    /// Merchant id.
    pub id: Uuid,
    /// Display name.
    pub business_name: String,
    /// Fee override in basis points, if any.
    pub fee_bps: Option<i32>,
    /// Whether the merchant accepts payments.
    pub is_active: bool,
}

/// POST `/merchants` - Register the caller as a merchant.
async fn register_merchant(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<RegisterMerchantRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let identity = auth.identity();
    if !identity.verified_merchant {
        return Err(ApiError::Forbidden(
            "only verified sellers can register a merchant profile".to_string(),
        ));
    }

    let merchant = state
        .merchants
        .register(RegisterMerchant {
            owner_id: identity.owner_id,
            verified_merchant: identity.verified_merchant,
            business_name: req.business_name,
            fee_bps: req.fee_bps,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(merchant)))
}

/// GET `/merchants/{merchant_id}` - Look up a merchant.
async fn get_merchant(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(merchant_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let merchant = state.merchants.get(MerchantId::from_uuid(merchant_id)).await?;
    Ok((
        StatusCode::OK,
        Json(MerchantResponse {
            id: merchant.id,
            business_name: merchant.business_name,
            fee_bps: merchant.fee_bps,
            is_active: merchant.is_active,
        }),
    ))
}
