//! Wallet routes: initialization, summary, PIN, history, holds, recipients
//! and the ledger audit.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use campuspay_core::pin::hash_pin;
use campuspay_core::wallet::{TransactionKind, TransactionStatus};
use campuspay_db::repositories::{CreateWallet, TransactionFilter};
use campuspay_shared::types::PageRequest;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::{AppState, error::ApiError, middleware::AuthUser};

/// Creates the wallet routes (requires auth middleware to be applied externally).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/wallet", post(create_wallet).get(get_wallet))
        .route("/wallet/pin", put(change_pin))
        .route("/wallet/transactions", get(list_transactions))
        .route("/wallet/transactions/{reference}", get(get_transaction))
        .route("/wallet/holds", get(list_holds))
        .route("/wallet/recipients", get(list_recipients))
        .route("/wallet/recipients/rebuild", post(rebuild_recipients))
        .route("/wallet/audit", get(audit_wallet))
}

/// Request body for initializing a wallet.
#[derive(Debug, Deserialize)]
pub struct CreateWalletRequest {
    /// 4-6 digit PIN.
    pub pin: String,
    /// Optional unique handle other students can pay.
    pub contact_handle: Option<String>,
    /// IANA timezone for the spend windows; defaults to the ledger timezone.
    pub timezone: Option<String>,
}

/// Request body for changing the PIN.
#[derive(Debug, Deserialize)]
pub struct ChangePinRequest {
    /// Current PIN.
    pub current_pin: String,
    /// Replacement PIN.
    pub new_pin: String,
}

/// Query parameters for the transaction history.
#[derive(Debug, Deserialize)]
pub struct TransactionQuery {
    /// Kind filter, e.g. `transfer_send`.
    pub kind: Option<String>,
    /// Status filter, e.g. `completed`.
    pub status: Option<String>,
    /// Created at or after.
    pub from: Option<DateTime<Utc>>,
    /// Created before.
    pub to: Option<DateTime<Utc>>,
    /// Page number, 1-indexed.
    pub page: Option<u32>,
    /// Page size.
    pub per_page: Option<u32>,
}

/// Query parameters for the hold list.
#[derive(Debug, Deserialize)]
pub struct HoldQuery {
    /// Only holds that have not been released.
    #[serde(default)]
    pub active: bool,
}

/// POST `/wallet` - Initialize the caller's wallet.
async fn create_wallet(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<CreateWalletRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let pin_hash = hash_pin(&req.pin).map_err(campuspay_core::WalletError::from)?;
    let mut input = CreateWallet::new(auth.owner(), pin_hash, &state.ledger);
    if let Some(handle) = req.contact_handle {
        input = input.with_handle(handle);
    }
    if let Some(timezone) = req.timezone {
        input = input.with_timezone(timezone);
    }

    let wallet = state.wallets.create_wallet(input).await?;
    info!(wallet_id = %wallet.id, role = auth.role(), "wallet initialized");
    Ok((StatusCode::CREATED, Json(wallet)))
}

/// GET `/wallet` - Balance with today's and this month's spend.
async fn get_wallet(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let summary = state.wallets.summary(auth.owner(), Utc::now()).await?;
    Ok((StatusCode::OK, Json(summary)))
}

/// PUT `/wallet/pin` - Replace the PIN.
async fn change_pin(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<ChangePinRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .wallets
        .change_pin(auth.owner(), &req.current_pin, &req.new_pin, &state.limiter)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET `/wallet/transactions` - Paged history, newest first.
async fn list_transactions(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<TransactionQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = TransactionFilter {
        kind: query
            .kind
            .as_deref()
            .map(|s| {
                TransactionKind::parse(s)
                    .ok_or_else(|| ApiError::BadRequest(format!("unknown transaction kind '{s}'")))
            })
            .transpose()?,
        status: query
            .status
            .as_deref()
            .map(|s| {
                TransactionStatus::parse(s).ok_or_else(|| {
                    ApiError::BadRequest(format!("unknown transaction status '{s}'"))
                })
            })
            .transpose()?,
        from: query.from,
        to: query.to,
    };
    let defaults = PageRequest::default();
    let page = PageRequest::new(
        query.page.unwrap_or(defaults.page),
        query.per_page.unwrap_or(defaults.per_page),
    );

    let wallet = state.wallets.get_wallet(auth.owner()).await?;
    let transactions = state
        .wallets
        .list_transactions(wallet.wallet_id(), &filter, page)
        .await?;
    Ok((StatusCode::OK, Json(transactions)))
}

/// GET `/wallet/transactions/{reference}` - One transaction of the caller.
async fn get_transaction(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(reference): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let wallet = state.wallets.get_wallet(auth.owner()).await?;
    let transaction = state
        .wallets
        .get_transaction(wallet.wallet_id(), &reference)
        .await?;
    Ok((StatusCode::OK, Json(transaction)))
}

/// GET `/wallet/holds` - Holds of the caller's wallet.
async fn list_holds(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<HoldQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let wallet = state.wallets.get_wallet(auth.owner()).await?;
    let holds = state
        .holds
        .list_holds(wallet.wallet_id(), query.active, Utc::now())
        .await?;
    Ok((StatusCode::OK, Json(json!({ "holds": holds }))))
}

/// GET `/wallet/recipients` - Recently paid wallets.
async fn list_recipients(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let recipients = state.recipients.list(auth.owner()).await?;
    Ok((StatusCode::OK, Json(json!({ "recipients": recipients }))))
}

/// POST `/wallet/recipients/rebuild` - Recompute recipients from history.
async fn rebuild_recipients(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let rebuilt = state.recipients.rebuild(auth.owner()).await?;
    Ok((StatusCode::OK, Json(json!({ "recipients": rebuilt }))))
}

/// GET `/wallet/audit` - Replay the caller's ledger against the stored balance.
async fn audit_wallet(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let wallet = state.wallets.get_wallet(auth.owner()).await?;
    let report = state.wallets.verify_ledger(wallet.wallet_id()).await?;
    Ok((StatusCode::OK, Json(report)))
}
