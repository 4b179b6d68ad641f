//! Wallet repository: the Ledger Store.
//!
//! Owns wallet creation and every balance mutation that is not part of a
//! larger flow. Transfers and settlement reuse the same posting primitives
//! from [`super::ledger`] inside their own units of work.

use campuspay_core::WalletError;
use campuspay_core::limits::{SpendCaps, SpendTotals, SpendWindows, parse_timezone};
use campuspay_core::pin::hash_pin;
use campuspay_core::security::AttemptLimiter;
use campuspay_core::wallet::{
    AuditReport, ReplayEntry, TransactionKind, TransactionStatus, audit_wallet, validate_reference,
};
use campuspay_shared::config::LedgerConfig;
use campuspay_shared::types::{Money, PageRequest, PageResponse, UserId, WalletId};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, SqlErr, TransactionTrait,
};
use serde::Serialize;

use super::ledger::{
    AppliedTransaction, NewTransaction, active_hold_total, apply_in_txn, find_wallet_by_owner,
    lock_wallet, retry_contended, spend_totals,
};
use crate::entities::{sea_orm_active_enums as db_enums, wallet_transactions, wallets};
use crate::error::{StoreError, StoreResult};

/// PIN hash stored on system wallets; never parses, so no PIN can match.
const UNUSABLE_PIN_HASH: &str = "!";

/// Input for creating a wallet.
#[derive(Debug, Clone)]
pub struct CreateWallet {
    /// Owner id from the caller identity.
    pub owner_id: UserId,
    /// Argon2id hash of the wallet PIN.
    pub pin_hash: String,
    /// Optional unique handle other users can pay.
    pub contact_handle: Option<String>,
    /// ISO currency code.
    pub currency: String,
    /// IANA timezone for spend windows.
    pub timezone: String,
    /// Daily spend cap.
    pub daily_limit: Money,
    /// Monthly spend cap.
    pub monthly_limit: Money,
}

impl CreateWallet {
    /// Input with the configured defaults.
    #[must_use]
    pub fn new(owner_id: UserId, pin_hash: String, config: &LedgerConfig) -> Self {
        Self {
            owner_id,
            pin_hash,
            contact_handle: None,
            currency: config.currency.clone(),
            timezone: config.timezone.clone(),
            daily_limit: Money::from_minor(config.daily_limit),
            monthly_limit: Money::from_minor(config.monthly_limit),
        }
    }

    /// Sets the contact handle.
    #[must_use]
    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.contact_handle = Some(handle.into());
        self
    }

    /// Overrides the timezone.
    #[must_use]
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }
}

/// Normalizes and validates a contact handle: 3-32 characters of lowercase
/// letters, digits, `.` and `_`.
pub fn normalize_handle(handle: &str) -> Result<String, WalletError> {
    let handle = handle.trim().trim_start_matches('@').to_lowercase();
    let valid = (3..=32).contains(&handle.len())
        && handle
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'.' || b == b'_');
    if valid {
        Ok(handle)
    } else {
        Err(WalletError::InvalidRequest(
            "contact handle must be 3-32 letters, digits, '.' or '_'".to_string(),
        ))
    }
}

/// Filter options for listing transactions.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    /// Filter by kind.
    pub kind: Option<TransactionKind>,
    /// Filter by status.
    pub status: Option<TransactionStatus>,
    /// Created at or after.
    pub from: Option<DateTime<Utc>>,
    /// Created before.
    pub to: Option<DateTime<Utc>>,
}

/// Balance plus spend in the current windows.
#[derive(Debug, Clone, Serialize)]
pub struct WalletSummary {
    /// Wallet row.
    pub wallet: wallets::Model,
    /// Windows the totals were computed for.
    pub windows: SpendWindows,
    /// Spent today and this month.
    pub spent: SpendTotals,
    /// Configured caps.
    pub caps: SpendCaps,
    /// Allowance left.
    pub remaining: SpendTotals,
    /// Sum of unreleased holds.
    pub held: Money,
}

/// Repository for wallets and their transactions.
#[derive(Debug, Clone)]
pub struct WalletRepository {
    db: DatabaseConnection,
}

impl WalletRepository {
    /// Creates a new wallet repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Creates a wallet. Fails with `AlreadyExists` if the owner already has
    /// one or the handle is taken.
    pub async fn create_wallet(&self, input: CreateWallet) -> StoreResult<wallets::Model> {
        let handle = input
            .contact_handle
            .as_deref()
            .map(normalize_handle)
            .transpose()?;
        parse_timezone(&input.timezone)?;
        if !input.daily_limit.is_positive() || input.monthly_limit < input.daily_limit {
            return Err(WalletError::InvalidRequest(
                "limits must satisfy 0 < daily <= monthly".to_string(),
            )
            .into());
        }

        if find_wallet_by_owner(&self.db, input.owner_id).await?.is_some() {
            return Err(
                WalletError::AlreadyExists(format!("wallet for owner {}", input.owner_id)).into(),
            );
        }
        if let Some(handle) = &handle {
            if self.find_by_handle(handle).await?.is_some() {
                return Err(WalletError::AlreadyExists(format!("contact handle {handle}")).into());
            }
        }

        let now = Utc::now();
        let model = wallets::ActiveModel {
            id: Set(WalletId::new().into_inner()),
            owner_id: Set(input.owner_id.into_inner()),
            contact_handle: Set(handle),
            balance: Set(0),
            available_balance: Set(0),
            currency: Set(input.currency),
            pin_hash: Set(input.pin_hash),
            daily_limit: Set(input.daily_limit.minor()),
            monthly_limit: Set(input.monthly_limit.minor()),
            timezone: Set(input.timezone),
            is_active: Set(true),
            is_verified: Set(false),
            is_system: Set(false),
            version: Set(0),
            last_activity_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let wallet = model.insert(&self.db).await.map_err(|err| {
            if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                StoreError::from(WalletError::AlreadyExists(format!(
                    "wallet or contact handle for owner {}",
                    input.owner_id
                )))
            } else {
                StoreError::from(err)
            }
        })?;

        tracing::info!(wallet_id = %wallet.id, owner_id = %wallet.owner_id, "wallet created");
        Ok(wallet)
    }

    /// Creates the fee-sink wallet if it does not exist yet.
    pub async fn ensure_system_wallet(
        &self,
        owner: UserId,
        config: &LedgerConfig,
    ) -> StoreResult<wallets::Model> {
        if let Some(existing) = find_wallet_by_owner(&self.db, owner).await? {
            if !existing.is_system {
                return Err(WalletError::InvariantViolation(format!(
                    "fee sink owner {owner} holds a regular wallet"
                ))
                .into());
            }
            return Ok(existing);
        }

        let now = Utc::now();
        let wallet = wallets::ActiveModel {
            id: Set(WalletId::new().into_inner()),
            owner_id: Set(owner.into_inner()),
            contact_handle: Set(None),
            balance: Set(0),
            available_balance: Set(0),
            currency: Set(config.currency.clone()),
            pin_hash: Set(UNUSABLE_PIN_HASH.to_string()),
            daily_limit: Set(config.daily_limit),
            monthly_limit: Set(config.monthly_limit),
            timezone: Set(config.timezone.clone()),
            is_active: Set(true),
            is_verified: Set(true),
            is_system: Set(true),
            version: Set(0),
            last_activity_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await?;

        tracing::info!(wallet_id = %wallet.id, "fee sink wallet created");
        Ok(wallet)
    }

    /// Gets the wallet of an owner.
    pub async fn get_wallet(&self, owner: UserId) -> StoreResult<wallets::Model> {
        find_wallet_by_owner(&self.db, owner)
            .await?
            .ok_or_else(|| WalletError::WalletNotFound(format!("no wallet for owner {owner}")).into())
    }

    /// Gets a wallet by id.
    pub async fn get_wallet_by_id(&self, wallet_id: WalletId) -> StoreResult<wallets::Model> {
        wallets::Entity::find_by_id(wallet_id.into_inner())
            .one(&self.db)
            .await?
            .ok_or_else(|| WalletError::WalletNotFound(wallet_id.to_string()).into())
    }

    /// Finds a wallet by contact handle.
    pub async fn find_by_handle(&self, handle: &str) -> StoreResult<Option<wallets::Model>> {
        Ok(wallets::Entity::find()
            .filter(
                wallets::Column::ContactHandle
                    .eq(handle.trim().trim_start_matches('@').to_lowercase()),
            )
            .one(&self.db)
            .await?)
    }

    /// Applies one transaction atomically. Idempotent on the reference.
    pub async fn apply_transaction(&self, new: NewTransaction) -> StoreResult<AppliedTransaction> {
        validate_reference(&new.reference)?;
        let new = &new;
        retry_contended(&new.reference, move || async move {
            let txn = self.db.begin().await?;
            let applied = apply_in_txn(&txn, new, Utc::now()).await?;
            txn.commit().await?;
            Ok(applied)
        })
        .await
    }

    /// Gets one transaction of a wallet by reference.
    pub async fn get_transaction(
        &self,
        wallet_id: WalletId,
        reference: &str,
    ) -> StoreResult<wallet_transactions::Model> {
        wallet_transactions::Entity::find()
            .filter(wallet_transactions::Column::WalletId.eq(wallet_id.into_inner()))
            .filter(wallet_transactions::Column::Reference.eq(reference))
            .one(&self.db)
            .await?
            .ok_or_else(|| WalletError::TransactionNotFound(reference.to_string()).into())
    }

    /// Lists transactions of a wallet, newest first.
    pub async fn list_transactions(
        &self,
        wallet_id: WalletId,
        filter: &TransactionFilter,
        page: PageRequest,
    ) -> StoreResult<PageResponse<wallet_transactions::Model>> {
        let mut query = wallet_transactions::Entity::find()
            .filter(wallet_transactions::Column::WalletId.eq(wallet_id.into_inner()));

        if let Some(kind) = filter.kind {
            query = query.filter(
                wallet_transactions::Column::Kind.eq(db_enums::TransactionKind::from(kind)),
            );
        }
        if let Some(status) = filter.status {
            query = query.filter(
                wallet_transactions::Column::Status.eq(db_enums::TransactionStatus::from(status)),
            );
        }
        if let Some(from) = filter.from {
            query = query.filter(wallet_transactions::Column::CreatedAt.gte(from));
        }
        if let Some(to) = filter.to {
            query = query.filter(wallet_transactions::Column::CreatedAt.lt(to));
        }

        let total = query.clone().count(&self.db).await?;
        let rows = query
            .order_by_desc(wallet_transactions::Column::CreatedAt)
            .order_by_desc(wallet_transactions::Column::Id)
            .offset(page.offset())
            .limit(page.limit())
            .all(&self.db)
            .await?;

        Ok(PageResponse::new(rows, page, total))
    }

    /// Balance, spend and remaining allowance of an owner's wallet.
    pub async fn summary(&self, owner: UserId, now: DateTime<Utc>) -> StoreResult<WalletSummary> {
        let wallet = self.get_wallet(owner).await?;
        let (windows, spent) = spend_totals(&self.db, &wallet, now).await?;
        let held = active_hold_total(&self.db, wallet.id).await?;
        let caps = SpendCaps {
            daily: Money::from_minor(wallet.daily_limit),
            monthly: Money::from_minor(wallet.monthly_limit),
        };
        Ok(WalletSummary {
            remaining: caps.remaining(&spent),
            windows,
            spent,
            caps,
            held,
            wallet,
        })
    }

    /// Replaces the PIN after verifying the current one.
    pub async fn change_pin(
        &self,
        owner: UserId,
        current_pin: &str,
        new_pin: &str,
        limiter: &AttemptLimiter,
    ) -> StoreResult<()> {
        let wallet = self.get_wallet(owner).await?;
        limiter.verify(owner, current_pin, &wallet.pin_hash)?;
        let pin_hash = hash_pin(new_pin).map_err(WalletError::from)?;

        let now = Utc::now();
        wallets::Entity::update_many()
            .col_expr(wallets::Column::PinHash, Expr::value(pin_hash))
            .col_expr(wallets::Column::UpdatedAt, Expr::value(now))
            .filter(wallets::Column::Id.eq(wallet.id))
            .exec(&self.db)
            .await?;

        tracing::info!(wallet_id = %wallet.id, "PIN changed");
        Ok(())
    }

    /// Replays every completed transaction of a wallet and checks the stored
    /// balances against the replay and the active holds.
    pub async fn verify_ledger(&self, wallet_id: WalletId) -> StoreResult<AuditReport> {
        let txn = self.db.begin().await?;
        let wallet = lock_wallet(&txn, wallet_id).await?;

        let rows = wallet_transactions::Entity::find()
            .filter(wallet_transactions::Column::WalletId.eq(wallet.id))
            .filter(wallet_transactions::Column::Status.eq(db_enums::TransactionStatus::Completed))
            .order_by_asc(wallet_transactions::Column::PostingSeq)
            .all(&txn)
            .await?;
        let held = active_hold_total(&txn, wallet.id).await?;
        txn.commit().await?;

        let entries = rows
            .iter()
            .map(|row| match (row.balance_before, row.balance_after) {
                (Some(before), Some(after)) => Ok(ReplayEntry {
                    reference: row.reference.clone(),
                    balance_before: Money::from_minor(before),
                    balance_after: Money::from_minor(after),
                    net_amount: row.net(),
                }),
                _ => Err(WalletError::InvariantViolation(format!(
                    "completed transaction {} has no balance snapshot",
                    row.reference
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let report = audit_wallet(
            Money::from_minor(wallet.balance),
            Money::from_minor(wallet.available_balance),
            held,
            &entries,
        )?;
        tracing::debug!(wallet_id = %wallet.id, transactions = report.transactions, "ledger verified");
        Ok(report)
    }

    /// Deactivates or reactivates a wallet.
    pub async fn set_active(&self, wallet_id: WalletId, active: bool) -> StoreResult<()> {
        let result = wallets::Entity::update_many()
            .col_expr(wallets::Column::IsActive, Expr::value(active))
            .col_expr(wallets::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(wallets::Column::Id.eq(wallet_id.into_inner()))
            .exec(&self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(WalletError::WalletNotFound(wallet_id.to_string()).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("ada", "ada")]
    #[case("@Ada.Obi", "ada.obi")]
    #[case("  chi_99 ", "chi_99")]
    fn test_normalize_handle(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(normalize_handle(raw).unwrap(), expected);
    }

    #[rstest]
    #[case("ab")]
    #[case("has space")]
    #[case("emoji🙂")]
    fn test_normalize_handle_rejects(#[case] raw: &str) {
        assert!(normalize_handle(raw).is_err());
    }
}
