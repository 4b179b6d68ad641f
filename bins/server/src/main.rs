//! Campuspay API server.
//!
//! Serves the HTTP API and runs the settlement worker that drives queued
//! payouts and the reconciliation sweep.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use campuspay_api::{AppState, create_router};
use campuspay_core::settlement::{PaymentGateway, SandboxGateway};
use campuspay_db::connect_with;
use campuspay_db::repositories::{PayoutSweep, ReconcileReport, SettlementService};
use campuspay_shared::AppConfig;
use campuspay_shared::config::GatewayMode;
use campuspay_shared::types::UserId;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "campuspay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load()?;
    config.validate()?;

    let db = connect_with(&config.database).await?;
    info!("Connected to database");

    let gateway: Arc<dyn PaymentGateway> = match config.gateway.mode {
        GatewayMode::Sandbox => Arc::new(SandboxGateway::new()),
    };
    info!(
        mode = ?config.gateway.mode,
        timeout_secs = config.gateway.timeout_secs,
        "payment gateway configured"
    );

    let state = AppState::new(db, &config, gateway)?;
    let fee_sink = state
        .wallets
        .ensure_system_wallet(
            UserId::from_uuid(config.ledger.fee_wallet_owner),
            &config.ledger,
        )
        .await?;
    info!(wallet_id = %fee_sink.id, "fee sink ready");

    let worker = tokio::spawn(settlement_worker(
        state.settlement.clone(),
        Duration::from_secs(config.settlement.interval_secs.max(1)),
        config.settlement.payout_batch,
    ));

    let app = create_router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("shutdown requested");
        })
        .await?;

    worker.abort();
    Ok(())
}

/// Drives queued payouts, then sweeps expired holds and stale fundings.
/// Each pass works from persisted rows, so a restart loses nothing.
async fn settlement_worker(settlement: SettlementService, interval: Duration, batch: u64) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;

        match settlement.process_payouts(batch).await {
            Ok(sweep) if sweep != PayoutSweep::default() => info!(?sweep, "payout pass"),
            Ok(_) => {}
            Err(e) => error!(error = %e, "payout pass failed"),
        }

        match settlement.reconcile(Utc::now()).await {
            Ok(report) if report != ReconcileReport::default() => info!(?report, "reconciliation pass"),
            Ok(_) => {}
            Err(e) => error!(error = %e, "reconciliation pass failed"),
        }
    }
}
