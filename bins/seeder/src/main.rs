//! Database seeder for Campuspay development and testing.
//!
//! Seeds the fee-sink wallet, two student wallets funded through the sandbox
//! gateway, and a verified seller with a merchant profile, then prints bearer
//! tokens for each demo owner. Running it twice changes nothing.
//!
//! Usage: cargo run --bin seeder

use std::sync::Arc;

use campuspay_api::AppState;
use campuspay_core::WalletError;
use campuspay_core::pin::hash_pin;
use campuspay_core::settlement::SandboxGateway;
use campuspay_db::StoreError;
use campuspay_db::repositories::{CreateWallet, FundingCommand, RegisterMerchant};
use campuspay_shared::AppConfig;
use campuspay_shared::types::{Money, UserId};
use uuid::Uuid;

/// Demo PIN shared by every seeded wallet.
const DEMO_PIN: &str = "1234";

/// Demo owners (stable ids so tokens survive reseeding).
const ALICE_ID: &str = "00000000-0000-0000-0000-00000000a11c";
const BOB_ID: &str = "00000000-0000-0000-0000-000000000b0b";
const SELLER_ID: &str = "00000000-0000-0000-0000-0000000ca5e5";

struct DemoOwner {
    id: &'static str,
    handle: &'static str,
    role: &'static str,
    verified_merchant: bool,
    funding: i64,
}

const DEMO_OWNERS: [DemoOwner; 3] = [
    DemoOwner {
        id: ALICE_ID,
        handle: "alice",
        role: "student",
        verified_merchant: false,
        funding: 500_000,
    },
    DemoOwner {
        id: BOB_ID,
        handle: "bob",
        role: "student",
        verified_merchant: false,
        funding: 200_000,
    },
    DemoOwner {
        id: SELLER_ID,
        handle: "campus_cafe",
        role: "seller",
        verified_merchant: true,
        funding: 0,
    },
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    config.validate()?;

    println!("Connecting to database...");
    let db = campuspay_db::connect(&config.database.url).await?;
    let state = AppState::new(db, &config, Arc::new(SandboxGateway::new()))?;

    println!("Seeding fee sink...");
    let sink = state
        .wallets
        .ensure_system_wallet(
            UserId::from_uuid(config.ledger.fee_wallet_owner),
            &config.ledger,
        )
        .await?;
    println!("  fee sink wallet {}", sink.id);

    let pin_hash = hash_pin(DEMO_PIN).map_err(WalletError::from)?;
    for demo in &DEMO_OWNERS {
        println!("Seeding {}...", demo.handle);
        let owner = UserId::from_uuid(Uuid::parse_str(demo.id)?);
        seed_wallet(&state, owner, demo, &pin_hash).await?;
        if demo.funding > 0 {
            seed_funding(&state, owner, demo).await?;
        }
        if demo.verified_merchant {
            seed_merchant(&state, owner, demo).await?;
        }
    }

    println!("Development tokens (PIN {DEMO_PIN}):");
    for demo in &DEMO_OWNERS {
        let token = state.jwt_service.generate_access_token(
            Uuid::parse_str(demo.id)?,
            demo.role,
            demo.verified_merchant,
        )?;
        println!("  {:<12} {token}", demo.handle);
    }

    println!("Seeding complete!");
    Ok(())
}

async fn seed_wallet(
    state: &AppState,
    owner: UserId,
    demo: &DemoOwner,
    pin_hash: &str,
) -> Result<(), StoreError> {
    let input =
        CreateWallet::new(owner, pin_hash.to_string(), &state.ledger).with_handle(demo.handle);
    match state.wallets.create_wallet(input).await {
        Ok(wallet) => println!("  wallet {}", wallet.id),
        Err(e) if matches!(e.as_wallet_error(), Some(WalletError::AlreadyExists(_))) => {
            println!("  wallet already exists, skipping...");
        }
        Err(e) => return Err(e),
    }
    Ok(())
}

/// Funds through the sandbox gateway so the deposit fee reaches the fee sink
/// like any real funding.
async fn seed_funding(state: &AppState, owner: UserId, demo: &DemoOwner) -> Result<(), StoreError> {
    let reference = format!("FND-SEED-{}", demo.handle.to_uppercase());
    let init = state
        .settlement
        .initialize_funding(FundingCommand {
            owner,
            amount: Money::from_minor(demo.funding),
            email: format!("{}@campus.test", demo.handle),
            reference: Some(reference.clone()),
        })
        .await;
    match init {
        Ok(_) => {}
        Err(e) if matches!(e.as_wallet_error(), Some(WalletError::DuplicateReference(_))) => {
            println!("  funding already recorded, skipping...");
            return Ok(());
        }
        Err(e) => return Err(e),
    }

    let row = state.settlement.verify_funding(owner, &reference).await?;
    println!("  funded {} (net {}), status {:?}", row.amount, row.net_amount, row.status);
    Ok(())
}

async fn seed_merchant(state: &AppState, owner: UserId, demo: &DemoOwner) -> Result<(), StoreError> {
    if let Some(existing) = state.merchants.find_by_owner(owner).await? {
        println!("  merchant {} already exists, skipping...", existing.id);
        return Ok(());
    }
    let merchant = state
        .merchants
        .register(RegisterMerchant {
            owner_id: owner,
            verified_merchant: demo.verified_merchant,
            business_name: "Campus Cafe".to_string(),
            fee_bps: Some(150),
        })
        .await?;
    println!("  merchant {}", merchant.id);
    Ok(())
}
