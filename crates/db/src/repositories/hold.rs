//! Hold repository: reservations against available balance.

use campuspay_core::holds::{HoldState, ReleaseReason};
use campuspay_core::wallet::validate_reference;
use campuspay_shared::types::WalletId;
use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::Serialize;

use super::ledger::{
    NewHold, ReleasedHold, expired_holds, place_hold_in_txn, release_and_close_in_txn,
    retry_contended,
};
use crate::entities::holds;
use crate::error::StoreResult;

/// A hold with its state at the time it was read.
#[derive(Debug, Clone, Serialize)]
pub struct HoldView {
    /// Hold row.
    #[serde(flatten)]
    pub hold: holds::Model,
    /// Derived state.
    pub state: HoldState,
}

/// Repository for holds.
#[derive(Debug, Clone)]
pub struct HoldRepository {
    db: DatabaseConnection,
}

impl HoldRepository {
    /// Creates a new hold repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Places a hold. Fails with `InsufficientFunds` if the available balance
    /// does not cover it.
    pub async fn place_hold(&self, new: NewHold) -> StoreResult<holds::Model> {
        validate_reference(&new.reference)?;
        let new = &new;
        retry_contended(&new.reference, move || async move {
            let txn = self.db.begin().await?;
            let hold = place_hold_in_txn(&txn, new, Utc::now()).await?;
            txn.commit().await?;
            Ok(hold)
        })
        .await
    }

    /// Releases a hold. Releasing an already released hold is a no-op.
    ///
    /// A processing payout backed by the hold is failed in the same unit of
    /// work; settlement can no longer debit it.
    pub async fn release_hold(
        &self,
        reference: &str,
        reason: ReleaseReason,
    ) -> StoreResult<ReleasedHold> {
        let txn = self.db.begin().await?;
        let released = release_and_close_in_txn(&txn, reference, reason, Utc::now()).await?;
        txn.commit().await?;
        Ok(released)
    }

    /// Lists holds of a wallet, newest first.
    pub async fn list_holds(
        &self,
        wallet_id: WalletId,
        active_only: bool,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<HoldView>> {
        let mut query =
            holds::Entity::find().filter(holds::Column::WalletId.eq(wallet_id.into_inner()));
        if active_only {
            query = query.filter(holds::Column::ReleasedAt.is_null());
        }
        let rows = query
            .order_by_desc(holds::Column::CreatedAt)
            .all(&self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|hold| HoldView {
                state: HoldState::at(hold.released_at, hold.expires_at, now),
                hold,
            })
            .collect())
    }

    /// Releases up to `limit` holds that expired before `now`, each in its
    /// own unit of work, failing any payout left processing behind them.
    /// Returns only the releases this call performed.
    pub async fn expire_holds(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> StoreResult<Vec<ReleasedHold>> {
        let mut released = Vec::new();
        for hold in expired_holds(&self.db, now, limit).await? {
            let txn = self.db.begin().await?;
            let outcome =
                release_and_close_in_txn(&txn, &hold.reference, ReleaseReason::Expired, now)
                    .await?;
            txn.commit().await?;
            if outcome.release.is_released() {
                tracing::warn!(hold = %hold.reference, "hold expired without settlement");
                released.push(outcome);
            }
        }
        Ok(released)
    }
}
