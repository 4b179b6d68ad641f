//! Wallet ledger schema.
//!
//! Written with the schema builder so the same migration runs on PostgreSQL
//! in production and SQLite in the integration tests.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ============================================================
        // PART 1: WALLETS
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(Wallets::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Wallets::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Wallets::OwnerId).uuid().not_null().unique_key())
                    .col(ColumnDef::new(Wallets::ContactHandle).string_len(64).unique_key())
                    .col(
                        ColumnDef::new(Wallets::Balance)
                            .big_integer()
                            .not_null()
                            .default(0)
                            .check(Expr::col(Wallets::Balance).gte(0)),
                    )
                    .col(
                        ColumnDef::new(Wallets::AvailableBalance)
                            .big_integer()
                            .not_null()
                            .default(0)
                            .check(Expr::col(Wallets::AvailableBalance).gte(0)),
                    )
                    .col(ColumnDef::new(Wallets::Currency).string_len(3).not_null())
                    .col(ColumnDef::new(Wallets::PinHash).string().not_null())
                    .col(ColumnDef::new(Wallets::DailyLimit).big_integer().not_null())
                    .col(ColumnDef::new(Wallets::MonthlyLimit).big_integer().not_null())
                    .col(ColumnDef::new(Wallets::Timezone).string_len(64).not_null())
                    .col(ColumnDef::new(Wallets::IsActive).boolean().not_null().default(true))
                    .col(ColumnDef::new(Wallets::IsVerified).boolean().not_null().default(false))
                    .col(ColumnDef::new(Wallets::IsSystem).boolean().not_null().default(false))
                    .col(ColumnDef::new(Wallets::Version).big_integer().not_null().default(0))
                    .col(ColumnDef::new(Wallets::LastActivityAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Wallets::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Wallets::UpdatedAt).timestamp_with_time_zone().not_null())
                    .check(Expr::col(Wallets::AvailableBalance).lte(Expr::col(Wallets::Balance)))
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // PART 2: WALLET TRANSACTIONS (append-only)
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(WalletTransactions::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(WalletTransactions::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(WalletTransactions::WalletId).uuid().not_null())
                    .col(
                        ColumnDef::new(WalletTransactions::Reference)
                            .string_len(64)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(WalletTransactions::Kind).string_len(24).not_null())
                    .col(ColumnDef::new(WalletTransactions::Amount).big_integer().not_null())
                    .col(ColumnDef::new(WalletTransactions::Fee).big_integer().not_null().default(0))
                    .col(ColumnDef::new(WalletTransactions::NetAmount).big_integer().not_null())
                    .col(ColumnDef::new(WalletTransactions::BalanceBefore).big_integer())
                    .col(ColumnDef::new(WalletTransactions::BalanceAfter).big_integer())
                    .col(ColumnDef::new(WalletTransactions::PostingSeq).big_integer())
                    .col(ColumnDef::new(WalletTransactions::Status).string_len(24).not_null())
                    .col(ColumnDef::new(WalletTransactions::CounterpartyWalletId).uuid())
                    .col(ColumnDef::new(WalletTransactions::Description).string_len(255))
                    .col(ColumnDef::new(WalletTransactions::Metadata).json())
                    .col(ColumnDef::new(WalletTransactions::HoldReference).string_len(64))
                    .col(ColumnDef::new(WalletTransactions::ProviderReference).string_len(128))
                    .col(
                        ColumnDef::new(WalletTransactions::ReconciliationRequired)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(WalletTransactions::FailureReason).text())
                    .col(ColumnDef::new(WalletTransactions::CompletedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(WalletTransactions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WalletTransactions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_wallet_transactions_wallet")
                            .from(WalletTransactions::Table, WalletTransactions::WalletId)
                            .to(Wallets::Table, Wallets::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // Spend-window and timeline lookups
        manager
            .create_index(
                Index::create()
                    .name("idx_wallet_transactions_completed")
                    .table(WalletTransactions::Table)
                    .col(WalletTransactions::WalletId)
                    .col(WalletTransactions::CompletedAt)
                    .to_owned(),
            )
            .await?;

        // Settlement worker scans
        manager
            .create_index(
                Index::create()
                    .name("idx_wallet_transactions_status")
                    .table(WalletTransactions::Table)
                    .col(WalletTransactions::Status)
                    .col(WalletTransactions::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // PART 3: HOLDS
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(Holds::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Holds::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Holds::WalletId).uuid().not_null())
                    .col(
                        ColumnDef::new(Holds::Amount)
                            .big_integer()
                            .not_null()
                            .check(Expr::col(Holds::Amount).gt(0)),
                    )
                    .col(ColumnDef::new(Holds::Reason).string_len(24).not_null())
                    .col(ColumnDef::new(Holds::Reference).string_len(64).not_null().unique_key())
                    .col(ColumnDef::new(Holds::ExpiresAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Holds::ReleasedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Holds::ReleaseReason).string_len(24))
                    .col(ColumnDef::new(Holds::CreatedAt).timestamp_with_time_zone().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_holds_wallet")
                            .from(Holds::Table, Holds::WalletId)
                            .to(Wallets::Table, Wallets::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_holds_expiry")
                    .table(Holds::Table)
                    .col(Holds::ReleasedAt)
                    .col(Holds::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // PART 4: MERCHANTS
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(Merchants::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Merchants::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Merchants::OwnerId).uuid().not_null().unique_key())
                    .col(ColumnDef::new(Merchants::WalletId).uuid().not_null())
                    .col(ColumnDef::new(Merchants::BusinessName).string_len(120).not_null())
                    .col(ColumnDef::new(Merchants::FeeBps).integer())
                    .col(ColumnDef::new(Merchants::IsActive).boolean().not_null().default(true))
                    .col(ColumnDef::new(Merchants::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Merchants::UpdatedAt).timestamp_with_time_zone().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_merchants_wallet")
                            .from(Merchants::Table, Merchants::WalletId)
                            .to(Wallets::Table, Wallets::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // PART 5: RECIPIENTS (derived cache)
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(Recipients::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Recipients::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Recipients::OwnerId).uuid().not_null())
                    .col(ColumnDef::new(Recipients::RecipientWalletId).uuid().not_null())
                    .col(ColumnDef::new(Recipients::RecipientOwnerId).uuid().not_null())
                    .col(ColumnDef::new(Recipients::TransferCount).big_integer().not_null().default(0))
                    .col(ColumnDef::new(Recipients::TotalSent).big_integer().not_null().default(0))
                    .col(ColumnDef::new(Recipients::LastTransferAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Recipients::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Recipients::UpdatedAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_recipients_owner_wallet")
                    .table(Recipients::Table)
                    .col(Recipients::OwnerId)
                    .col(Recipients::RecipientWalletId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for table in [
            Recipients::Table.into_iden(),
            Merchants::Table.into_iden(),
            Holds::Table.into_iden(),
            WalletTransactions::Table.into_iden(),
            Wallets::Table.into_iden(),
        ] {
            manager
                .drop_table(Table::drop().table(table).if_exists().to_owned())
                .await?;
        }
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Wallets {
    Table,
    Id,
    OwnerId,
    ContactHandle,
    Balance,
    AvailableBalance,
    Currency,
    PinHash,
    DailyLimit,
    MonthlyLimit,
    Timezone,
    IsActive,
    IsVerified,
    IsSystem,
    Version,
    LastActivityAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum WalletTransactions {
    Table,
    Id,
    WalletId,
    Reference,
    Kind,
    Amount,
    Fee,
    NetAmount,
    BalanceBefore,
    BalanceAfter,
    PostingSeq,
    Status,
    CounterpartyWalletId,
    Description,
    Metadata,
    HoldReference,
    ProviderReference,
    ReconciliationRequired,
    FailureReason,
    CompletedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Holds {
    Table,
    Id,
    WalletId,
    Amount,
    Reason,
    Reference,
    ExpiresAt,
    ReleasedAt,
    ReleaseReason,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Merchants {
    Table,
    Id,
    OwnerId,
    WalletId,
    BusinessName,
    FeeBps,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Recipients {
    Table,
    Id,
    OwnerId,
    RecipientWalletId,
    RecipientOwnerId,
    TransferCount,
    TotalSent,
    LastTransferAt,
    CreatedAt,
    UpdatedAt,
}
