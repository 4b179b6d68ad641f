//! Recipient repository: per-owner cache of transfer counterparts.
//!
//! The cache is derived data. It is updated after a transfer commits and
//! can be rebuilt from the transaction history at any time.

use std::collections::BTreeMap;

use campuspay_core::WalletError;
use campuspay_shared::types::{Money, UserId, WalletId};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, TransactionTrait,
};
use uuid::Uuid;

use super::ledger::find_wallet_by_owner;
use crate::entities::{recipients, sea_orm_active_enums as db_enums, wallet_transactions, wallets};
use crate::error::StoreResult;

/// Repository for the recipients cache.
#[derive(Debug, Clone)]
pub struct RecipientRepository {
    db: DatabaseConnection,
}

impl RecipientRepository {
    /// Creates a new recipient repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Counts one transfer from `owner` to `recipient`.
    pub async fn record_transfer(
        &self,
        owner: UserId,
        recipient_wallet: WalletId,
        recipient_owner: UserId,
        amount: Money,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let result = recipients::Entity::update_many()
            .col_expr(
                recipients::Column::TransferCount,
                Expr::col(recipients::Column::TransferCount).add(1),
            )
            .col_expr(
                recipients::Column::TotalSent,
                Expr::col(recipients::Column::TotalSent).add(amount.minor()),
            )
            .col_expr(recipients::Column::LastTransferAt, Expr::value(at))
            .col_expr(recipients::Column::UpdatedAt, Expr::value(at))
            .filter(recipients::Column::OwnerId.eq(owner.into_inner()))
            .filter(recipients::Column::RecipientWalletId.eq(recipient_wallet.into_inner()))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            recipients::ActiveModel {
                id: Set(Uuid::now_v7()),
                owner_id: Set(owner.into_inner()),
                recipient_wallet_id: Set(recipient_wallet.into_inner()),
                recipient_owner_id: Set(recipient_owner.into_inner()),
                transfer_count: Set(1),
                total_sent: Set(amount.minor()),
                last_transfer_at: Set(at),
                created_at: Set(at),
                updated_at: Set(at),
            }
            .insert(&self.db)
            .await?;
        }
        Ok(())
    }

    /// Lists an owner's recipients, most recent first.
    pub async fn list(&self, owner: UserId) -> StoreResult<Vec<recipients::Model>> {
        Ok(recipients::Entity::find()
            .filter(recipients::Column::OwnerId.eq(owner.into_inner()))
            .order_by_desc(recipients::Column::LastTransferAt)
            .all(&self.db)
            .await?)
    }

    /// Rebuilds an owner's cache from completed outgoing transfer and
    /// payment legs. Returns the number of recipients written.
    pub async fn rebuild(&self, owner: UserId) -> StoreResult<usize> {
        let wallet = find_wallet_by_owner(&self.db, owner)
            .await?
            .ok_or_else(|| WalletError::WalletNotFound(format!("no wallet for owner {owner}")))?;

        let legs = wallet_transactions::Entity::find()
            .filter(wallet_transactions::Column::WalletId.eq(wallet.id))
            .filter(wallet_transactions::Column::Status.eq(db_enums::TransactionStatus::Completed))
            .filter(wallet_transactions::Column::Kind.is_in([
                db_enums::TransactionKind::TransferSend,
                db_enums::TransactionKind::Payment,
            ]))
            .filter(wallet_transactions::Column::Amount.lt(0))
            .filter(wallet_transactions::Column::CounterpartyWalletId.is_not_null())
            .all(&self.db)
            .await?;

        // counterparty -> (count, total, last)
        let mut totals: BTreeMap<Uuid, (i64, i64, DateTime<Utc>)> = BTreeMap::new();
        for leg in &legs {
            let (Some(counterparty), Some(at)) = (leg.counterparty_wallet_id, leg.completed_at)
            else {
                continue;
            };
            let entry = totals.entry(counterparty).or_insert((0, 0, at));
            entry.0 += 1;
            entry.1 += leg.amount.abs();
            entry.2 = entry.2.max(at);
        }

        let owners: BTreeMap<Uuid, Uuid> = wallets::Entity::find()
            .filter(wallets::Column::Id.is_in(totals.keys().copied()))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|w| (w.id, w.owner_id))
            .collect();

        let now = Utc::now();
        let txn = self.db.begin().await?;
        recipients::Entity::delete_many()
            .filter(recipients::Column::OwnerId.eq(owner.into_inner()))
            .exec(&txn)
            .await?;

        let mut written = 0;
        for (wallet_id, (count, total, last)) in totals {
            let Some(recipient_owner) = owners.get(&wallet_id) else {
                continue;
            };
            recipients::ActiveModel {
                id: Set(Uuid::now_v7()),
                owner_id: Set(owner.into_inner()),
                recipient_wallet_id: Set(wallet_id),
                recipient_owner_id: Set(*recipient_owner),
                transfer_count: Set(count),
                total_sent: Set(total),
                last_transfer_at: Set(last),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(&txn)
            .await?;
            written += 1;
        }
        txn.commit().await?;

        tracing::info!(owner_id = %owner, recipients = written, "recipients rebuilt");
        Ok(written)
    }
}
