//! Shared fixtures for store integration tests.
//!
//! Every test gets its own SQLite database file in a temporary directory,
//! migrated by the real migrator. The pool holds several connections so
//! concurrent requests race on real database locks.

#![allow(dead_code)]

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use campuspay_core::fees::FeePolicy;
use campuspay_core::pin::hash_pin;
use campuspay_core::security::AttemptLimiter;
use campuspay_core::settlement::{PayoutDestination, SandboxGateway};
use campuspay_core::transfer::TransferPlanner;
use campuspay_core::wallet::TransactionKind;
use campuspay_db::entities::wallets;
use campuspay_db::migration::{Migrator, MigratorTrait};
use campuspay_db::repositories::{
    CreateWallet, HoldRepository, MerchantRepository, NewTransaction, RecipientRepository,
    SettlementOptions, SettlementService, TransferService, WalletRepository,
};
use campuspay_shared::config::LedgerConfig;
use campuspay_shared::types::{Currency, Money, UserId};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tempfile::TempDir;

pub const PIN: &str = "1234";

/// Argon2 is slow in debug builds; hash the test PIN once.
pub fn pin_hash() -> String {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| hash_pin(PIN).expect("hash test pin")).clone()
}

pub struct Harness {
    pub db: DatabaseConnection,
    /// Owns the database file.
    pub dir: TempDir,
    pub config: LedgerConfig,
    pub gateway: Arc<SandboxGateway>,
    pub wallets: WalletRepository,
    pub holds: HoldRepository,
    pub merchants: MerchantRepository,
    pub recipients: RecipientRepository,
    pub transfers: TransferService,
    pub settlement: SettlementService,
    pub fee_sink: wallets::Model,
}

pub async fn setup() -> Harness {
    setup_with(LedgerConfig::default(), Duration::from_millis(200)).await
}

pub async fn setup_with(config: LedgerConfig, gateway_timeout: Duration) -> Harness {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("ledger.db").display());
    let mut options = ConnectOptions::new(url);
    options
        .max_connections(5)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(options).await.expect("connect sqlite");
    Migrator::up(&db, None).await.expect("migrate");

    let fee_sink_owner = UserId::from_uuid(config.fee_wallet_owner);
    let wallets = WalletRepository::new(db.clone());
    let fee_sink = wallets
        .ensure_system_wallet(fee_sink_owner, &config)
        .await
        .expect("fee sink");

    let fees = FeePolicy::from(&config.fees);
    let limiter = AttemptLimiter::new(
        config.pin_max_attempts,
        Duration::from_secs(config.pin_lockout_secs),
    );
    let gateway = Arc::new(SandboxGateway::new());
    let options = SettlementOptions {
        currency: Currency::Ngn,
        hold_ttl: chrono::Duration::seconds(i64::try_from(config.hold_ttl_secs).expect("ttl")),
        gateway_timeout,
        fee_sink_owner,
        batch_size: 50,
    };

    Harness {
        holds: HoldRepository::new(db.clone()),
        merchants: MerchantRepository::new(db.clone()),
        recipients: RecipientRepository::new(db.clone()),
        transfers: TransferService::new(
            db.clone(),
            TransferPlanner::new(fees.clone()),
            limiter.clone(),
            fee_sink_owner,
        ),
        settlement: SettlementService::new(db.clone(), gateway.clone(), fees, limiter, options),
        gateway,
        wallets,
        fee_sink,
        config,
        db,
        dir,
    }
}

impl Harness {
    /// Opens a wallet for a fresh owner.
    pub async fn open_wallet(&self) -> (UserId, wallets::Model) {
        let owner = UserId::new();
        let wallet = self
            .wallets
            .create_wallet(CreateWallet::new(owner, pin_hash(), &self.config))
            .await
            .expect("create wallet");
        (owner, wallet)
    }

    /// Opens a wallet and credits it with `amount`.
    pub async fn funded_wallet(&self, amount: i64) -> (UserId, wallets::Model) {
        let (owner, wallet) = self.open_wallet().await;
        self.credit(&wallet, amount).await;
        (owner, wallet)
    }

    /// Credits a wallet directly, as a verified funding would.
    pub async fn credit(&self, wallet: &wallets::Model, amount: i64) {
        self.wallets
            .apply_transaction(NewTransaction::new(
                wallet.wallet_id(),
                format!("FND-TEST-{}", uuid::Uuid::new_v4().simple()),
                TransactionKind::Deposit,
                Money::from_minor(amount),
            ))
            .await
            .expect("credit");
    }

    /// Balance and available balance of an owner's wallet.
    pub async fn balances(&self, owner: UserId) -> (i64, i64) {
        let wallet = self.wallets.get_wallet(owner).await.expect("wallet");
        (wallet.balance, wallet.available_balance)
    }

    pub async fn fee_sink_balance(&self) -> i64 {
        self.wallets
            .get_wallet_by_id(self.fee_sink.wallet_id())
            .await
            .expect("fee sink")
            .balance
    }
}

pub fn bank_account() -> PayoutDestination {
    PayoutDestination::BankAccount {
        bank_code: "058".to_string(),
        account_number: "0123456789".to_string(),
        account_name: "Ada Obi".to_string(),
    }
}

pub fn biller() -> PayoutDestination {
    PayoutDestination::Biller {
        biller_code: "HOSTEL".to_string(),
        customer_id: "BLK-C-214".to_string(),
    }
}
