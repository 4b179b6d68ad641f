//! `SeaORM` Entity for wallet_transactions table.
//!
//! Append-only: rows are inserted once and only their status, balance
//! snapshot and settlement bookkeeping move forward afterwards.

use campuspay_shared::types::Money;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sea_orm_active_enums::{TransactionKind, TransactionStatus};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "wallet_transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub wallet_id: Uuid,
    #[sea_orm(unique)]
    pub reference: String,
    pub kind: TransactionKind,
    pub amount: i64,
    pub fee: i64,
    pub net_amount: i64,
    pub balance_before: Option<i64>,
    pub balance_after: Option<i64>,
    /// Wallet version after this posting; orders the balance timeline.
    pub posting_seq: Option<i64>,
    pub status: TransactionStatus,
    pub counterparty_wallet_id: Option<Uuid>,
    pub description: Option<String>,
    pub metadata: Option<Json>,
    pub hold_reference: Option<String>,
    pub provider_reference: Option<String>,
    pub reconciliation_required: bool,
    pub failure_reason: Option<String>,
    pub completed_at: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::wallets::Entity",
        from = "Column::WalletId",
        to = "super::wallets::Column::Id"
    )]
    Wallets,
}

impl Related<super::wallets::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Wallets.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Signed amount.
    #[must_use]
    pub fn amount(&self) -> Money {
        Money::from_minor(self.amount)
    }

    /// Fee.
    #[must_use]
    pub fn fee(&self) -> Money {
        Money::from_minor(self.fee)
    }

    /// Net amount.
    #[must_use]
    pub fn net(&self) -> Money {
        Money::from_minor(self.net_amount)
    }
}
