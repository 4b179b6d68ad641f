//! `SeaORM` Entity for wallets table.

use campuspay_core::WalletResult;
use campuspay_core::wallet::BalanceSnapshot;
use campuspay_shared::types::{Money, UserId, WalletId};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "wallets")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub owner_id: Uuid,
    #[sea_orm(unique)]
    pub contact_handle: Option<String>,
    pub balance: i64,
    pub available_balance: i64,
    pub currency: String,
    #[serde(skip_serializing)]
    pub pin_hash: String,
    pub daily_limit: i64,
    pub monthly_limit: i64,
    pub timezone: String,
    pub is_active: bool,
    pub is_verified: bool,
    pub is_system: bool,
    pub version: i64,
    pub last_activity_at: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::wallet_transactions::Entity")]
    WalletTransactions,
    #[sea_orm(has_many = "super::holds::Entity")]
    Holds,
}

impl Related<super::wallet_transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WalletTransactions.def()
    }
}

impl Related<super::holds::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Holds.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Typed wallet id.
    #[must_use]
    pub fn wallet_id(&self) -> WalletId {
        WalletId::from_uuid(self.id)
    }

    /// Typed owner id.
    #[must_use]
    pub fn owner(&self) -> UserId {
        UserId::from_uuid(self.owner_id)
    }

    /// Current balances, checked against the balance invariants.
    pub fn snapshot(&self) -> WalletResult<BalanceSnapshot> {
        BalanceSnapshot::new(
            Money::from_minor(self.balance),
            Money::from_minor(self.available_balance),
        )
    }
}
