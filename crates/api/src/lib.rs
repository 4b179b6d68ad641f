//! HTTP API layer with Axum routes and middleware.
//!
//! This crate provides:
//! - REST routes for wallets, payments, QR codes and merchants
//! - Bearer-token identity middleware
//! - Mapping from ledger errors to JSON responses

pub mod error;
pub mod middleware;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use campuspay_core::WalletError;
use campuspay_core::fees::FeePolicy;
use campuspay_core::security::AttemptLimiter;
use campuspay_core::settlement::PaymentGateway;
use campuspay_core::transfer::TransferPlanner;
use campuspay_db::repositories::{
    HoldRepository, MerchantRepository, RecipientRepository, SettlementOptions, SettlementService,
    TransferService, WalletRepository,
};
use campuspay_shared::config::{AppConfig, LedgerConfig};
use campuspay_shared::JwtService;
use campuspay_shared::types::UserId;
use sea_orm::DatabaseConnection;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// JWT service for token validation.
    pub jwt_service: Arc<JwtService>,
    /// Ledger defaults (currency, limits, QR validity).
    pub ledger: Arc<LedgerConfig>,
    /// PIN attempt limiter shared by every PIN-checking operation.
    pub limiter: AttemptLimiter,
    /// Wallets and their transactions.
    pub wallets: WalletRepository,
    /// Holds.
    pub holds: HoldRepository,
    /// Merchant profiles.
    pub merchants: MerchantRepository,
    /// Recipients cache.
    pub recipients: RecipientRepository,
    /// Transfer engine.
    pub transfers: TransferService,
    /// Funding and payouts.
    pub settlement: SettlementService,
}

impl AppState {
    /// Wires repositories and services over one connection pool.
    ///
    /// # Errors
    ///
    /// Returns `WalletError::InvalidRequest` if the ledger currency is unknown.
    pub fn new(
        db: DatabaseConnection,
        config: &AppConfig,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Result<Self, WalletError> {
        let ledger = config.ledger.clone();
        let fees = FeePolicy::from(&ledger.fees);
        let limiter = AttemptLimiter::new(
            ledger.pin_max_attempts,
            Duration::from_secs(ledger.pin_lockout_secs),
        );
        let fee_sink_owner = UserId::from_uuid(ledger.fee_wallet_owner);
        let options = SettlementOptions::from_config(config)?;

        Ok(Self {
            jwt_service: Arc::new(JwtService::new(
                &config.jwt.secret,
                config.jwt.access_token_expiry_secs,
            )),
            wallets: WalletRepository::new(db.clone()),
            holds: HoldRepository::new(db.clone()),
            merchants: MerchantRepository::new(db.clone()),
            recipients: RecipientRepository::new(db.clone()),
            transfers: TransferService::new(
                db.clone(),
                TransferPlanner::new(fees.clone()),
                limiter.clone(),
                fee_sink_owner,
            ),
            settlement: SettlementService::new(db, gateway, fees, limiter.clone(), options),
            limiter,
            ledger: Arc::new(ledger),
        })
    }
}

/// Creates the main application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes_with_state(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
