//! Merchant repository.

use campuspay_core::WalletError;
use campuspay_shared::types::{MerchantId, UserId};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait,
    QueryFilter, SqlErr, TransactionTrait,
};

use super::ledger::{find_wallet_by_owner, lock_wallet, retry_contended};
use crate::entities::{merchants, wallets};
use crate::error::{StoreError, StoreResult};

/// Highest accepted fee override, in basis points (100%).
pub const MAX_FEE_BPS: u32 = 10_000;

/// Input for registering a merchant profile.
#[derive(Debug, Clone)]
pub struct RegisterMerchant {
    /// Owner of the wallet the profile binds to.
    pub owner_id: UserId,
    /// Verified-merchant flag from the caller identity.
    pub verified_merchant: bool,
    /// Display name.
    pub business_name: String,
    /// Fee override in basis points.
    pub fee_bps: Option<u32>,
}

/// Repository for merchant profiles.
#[derive(Debug, Clone)]
pub struct MerchantRepository {
    db: DatabaseConnection,
}

impl MerchantRepository {
    /// Creates a new merchant repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Registers a merchant profile and marks the owner's wallet verified.
    pub async fn register(&self, input: RegisterMerchant) -> StoreResult<merchants::Model> {
        if !input.verified_merchant {
            return Err(WalletError::InvalidRequest(
                "only verified sellers can register a merchant profile".to_string(),
            )
            .into());
        }
        let business_name = input.business_name.trim().to_string();
        if business_name.is_empty() || business_name.len() > 120 {
            return Err(WalletError::InvalidRequest(
                "business name must be 1-120 characters".to_string(),
            )
            .into());
        }
        let fee_bps = match input.fee_bps {
            Some(bps) if bps > MAX_FEE_BPS => {
                return Err(WalletError::InvalidRequest(format!(
                    "fee override must be at most {MAX_FEE_BPS} basis points"
                ))
                .into());
            }
            Some(bps) => Some(i32::try_from(bps).unwrap_or(i32::MAX)),
            None => None,
        };

        let wallet = find_wallet_by_owner(&self.db, input.owner_id)
            .await?
            .ok_or_else(|| {
                WalletError::WalletNotFound(format!("no wallet for owner {}", input.owner_id))
            })?;
        let owner = input.owner_id;
        let (business_name, wallet) = (business_name.as_str(), &wallet);
        let merchant = retry_contended(&owner.to_string(), move || {
            self.insert_profile(owner, wallet, business_name, fee_bps)
        })
        .await?;

        tracing::info!(
            merchant_id = %merchant.id,
            wallet_id = %merchant.wallet_id,
            "merchant registered"
        );
        Ok(merchant)
    }

    /// One attempt at creating the profile. The `merchants.owner_id` unique
    /// key settles a race the lookup cannot.
    async fn insert_profile(
        &self,
        owner: UserId,
        wallet: &wallets::Model,
        business_name: &str,
        fee_bps: Option<i32>,
    ) -> StoreResult<merchants::Model> {
        let already_exists = || {
            StoreError::from(WalletError::AlreadyExists(format!(
                "merchant profile for owner {owner}"
            )))
        };

        let now = Utc::now();
        let txn = self.db.begin().await?;
        let locked = lock_wallet(&txn, wallet.wallet_id()).await?;
        let existing = merchants::Entity::find()
            .filter(merchants::Column::OwnerId.eq(owner.into_inner()))
            .one(&txn)
            .await?;
        if existing.is_some() {
            return Err(already_exists());
        }

        let merchant = merchants::ActiveModel {
            id: Set(MerchantId::new().into_inner()),
            owner_id: Set(owner.into_inner()),
            wallet_id: Set(locked.id),
            business_name: Set(business_name.to_string()),
            fee_bps: Set(fee_bps),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(|err| {
            if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                already_exists()
            } else {
                StoreError::from(err)
            }
        })?;

        wallets::Entity::update_many()
            .col_expr(wallets::Column::IsVerified, Expr::value(true))
            .col_expr(wallets::Column::UpdatedAt, Expr::value(now))
            .filter(wallets::Column::Id.eq(locked.id))
            .exec(&txn)
            .await?;
        txn.commit().await?;
        Ok(merchant)
    }

    /// Gets a merchant profile by id.
    pub async fn get(&self, merchant_id: MerchantId) -> StoreResult<merchants::Model> {
        merchants::Entity::find_by_id(merchant_id.into_inner())
            .one(&self.db)
            .await?
            .ok_or_else(|| WalletError::MerchantNotFound(merchant_id.to_string()).into())
    }

    /// Finds the merchant profile of an owner.
    pub async fn find_by_owner(&self, owner: UserId) -> StoreResult<Option<merchants::Model>> {
        Ok(merchants::Entity::find()
            .filter(merchants::Column::OwnerId.eq(owner.into_inner()))
            .one(&self.db)
            .await?)
    }
}
