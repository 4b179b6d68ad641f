//! Posting primitives shared by every repository and service.
//!
//! Functions here run inside a unit of work the caller owns: they take any
//! `ConnectionTrait` (normally a `DatabaseTransaction`) and never commit.
//! Wallet rows are locked with `SELECT ... FOR UPDATE` and every balance
//! write also checks and bumps `version`.

use std::collections::BTreeMap;

use campuspay_core::WalletError;
use campuspay_core::holds::{HoldReason, ReleaseReason, validate_hold};
use campuspay_core::limits::{SpendRecord, SpendTotals, SpendWindows, parse_timezone};
use campuspay_core::wallet::{
    BalanceSnapshot, Posting, TransactionKind, TransactionStatus, apply_net, net_amount, reserve,
    unreserve,
};
use campuspay_shared::types::{Money, UserId, WalletId};
use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use uuid::Uuid;

use crate::entities::{holds, sea_orm_active_enums as db_enums, wallet_transactions, wallets};
use crate::error::StoreResult;

/// One balance-affecting event to apply.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    /// Wallet the transaction posts to.
    pub wallet_id: WalletId,
    /// Globally unique reference.
    pub reference: String,
    /// Transaction kind.
    pub kind: TransactionKind,
    /// Signed amount; positive credits, negative debits.
    pub amount: Money,
    /// Fee deducted from the amount.
    pub fee: Money,
    /// Other side of the movement.
    pub counterparty: Option<WalletId>,
    /// Free-text description.
    pub description: Option<String>,
    /// Metadata stored on the row. Replaces the stored value when a pending
    /// row is completed.
    pub metadata: Option<serde_json::Value>,
}

impl NewTransaction {
    /// Creates a fee-less transaction without counterparty.
    #[must_use]
    pub fn new(
        wallet_id: WalletId,
        reference: impl Into<String>,
        kind: TransactionKind,
        amount: Money,
    ) -> Self {
        Self {
            wallet_id,
            reference: reference.into(),
            kind,
            amount,
            fee: Money::ZERO,
            counterparty: None,
            description: None,
            metadata: None,
        }
    }

    /// Sets the fee.
    #[must_use]
    pub fn with_fee(mut self, fee: Money) -> Self {
        self.fee = fee;
        self
    }

    /// Sets the counterparty.
    #[must_use]
    pub fn with_counterparty(mut self, counterparty: WalletId) -> Self {
        self.counterparty = Some(counterparty);
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    /// Sets the metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    fn matches(&self, row: &wallet_transactions::Model) -> bool {
        row.wallet_id == self.wallet_id.into_inner()
            && TransactionKind::from(row.kind) == self.kind
            && row.amount == self.amount.minor()
            && row.fee == self.fee.minor()
            && row.counterparty_wallet_id == self.counterparty.map(WalletId::into_inner)
    }
}

/// Outcome of `apply_transaction`.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedTransaction {
    /// The completed row.
    pub transaction: wallet_transactions::Model,
    /// True when the reference was already completed and nothing changed.
    pub replayed: bool,
}

/// A hold to place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHold {
    /// Wallet to reserve funds on.
    pub wallet_id: WalletId,
    /// Amount to reserve.
    pub amount: Money,
    /// Why.
    pub reason: HoldReason,
    /// Unique hold reference.
    pub reference: String,
    /// Time to live.
    pub ttl: Duration,
}

/// Outcome of releasing a hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HoldRelease {
    /// The hold was active and its amount is available again.
    Released(holds::Model),
    /// The hold had already been released; nothing changed.
    AlreadyReleased(holds::Model),
}

impl HoldRelease {
    /// Whether this call performed the release.
    #[must_use]
    pub const fn is_released(&self) -> bool {
        matches!(self, Self::Released(_))
    }

    /// The hold row after the call.
    #[must_use]
    pub fn hold(&self) -> &holds::Model {
        match self {
            Self::Released(hold) | Self::AlreadyReleased(hold) => hold,
        }
    }
}

/// Attempts for a unit of work that keeps losing a lock or version race.
const UNIT_OF_WORK_ATTEMPTS: u32 = 5;

/// Runs a unit of work, starting it over while it loses a lock or version
/// race. Every attempt reads afresh, so the loser of a race on one wallet
/// is decided against the winner's committed balance.
pub(crate) async fn retry_contended<T, F, Fut>(reference: &str, mut unit: F) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let mut attempt = 1;
    loop {
        match unit().await {
            Err(err)
                if attempt < UNIT_OF_WORK_ATTEMPTS
                    && matches!(
                        err.as_wallet_error(),
                        Some(WalletError::ConcurrentModification)
                    ) =>
            {
                tracing::debug!(%reference, attempt, "unit of work contended, retrying");
                tokio::time::sleep(std::time::Duration::from_millis(5_u64 << attempt)).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

/// Locks one wallet row for the rest of the unit of work.
pub(crate) async fn lock_wallet<C: ConnectionTrait>(
    conn: &C,
    wallet_id: WalletId,
) -> StoreResult<wallets::Model> {
    wallets::Entity::find_by_id(wallet_id.into_inner())
        .lock_exclusive()
        .one(conn)
        .await?
        .ok_or_else(|| WalletError::WalletNotFound(wallet_id.to_string()).into())
}

/// Locks several wallets in ascending id order.
pub(crate) async fn lock_wallets<C: ConnectionTrait>(
    conn: &C,
    wallet_ids: &[WalletId],
) -> StoreResult<BTreeMap<WalletId, wallets::Model>> {
    let mut ids = wallet_ids.to_vec();
    ids.sort_unstable();
    ids.dedup();

    let mut locked = BTreeMap::new();
    for id in ids {
        let wallet = lock_wallet(conn, id).await?;
        locked.insert(id, wallet);
    }
    Ok(locked)
}

/// Finds a wallet by owner without locking it.
pub(crate) async fn find_wallet_by_owner<C: ConnectionTrait>(
    conn: &C,
    owner: UserId,
) -> StoreResult<Option<wallets::Model>> {
    Ok(wallets::Entity::find()
        .filter(wallets::Column::OwnerId.eq(owner.into_inner()))
        .one(conn)
        .await?)
}

/// Looks up the fee-sink wallet. Its absence is a deployment bug.
pub(crate) async fn fee_sink<C: ConnectionTrait>(
    conn: &C,
    owner: UserId,
) -> StoreResult<wallets::Model> {
    find_wallet_by_owner(conn, owner).await?.ok_or_else(|| {
        WalletError::InvariantViolation(format!("fee sink wallet for {owner} is missing")).into()
    })
}

/// Writes new balances if the wallet still has the version it was read at.
pub(crate) async fn write_balances<C: ConnectionTrait>(
    conn: &C,
    wallet: &wallets::Model,
    after: BalanceSnapshot,
    now: DateTime<Utc>,
) -> StoreResult<wallets::Model> {
    let next_version = wallet.version + 1;
    let result = wallets::Entity::update_many()
        .col_expr(wallets::Column::Balance, Expr::value(after.balance.minor()))
        .col_expr(
            wallets::Column::AvailableBalance,
            Expr::value(after.available.minor()),
        )
        .col_expr(wallets::Column::Version, Expr::value(next_version))
        .col_expr(wallets::Column::LastActivityAt, Expr::value(now))
        .col_expr(wallets::Column::UpdatedAt, Expr::value(now))
        .filter(wallets::Column::Id.eq(wallet.id))
        .filter(wallets::Column::Version.eq(wallet.version))
        .exec(conn)
        .await?;

    if result.rows_affected != 1 {
        tracing::warn!(wallet_id = %wallet.id, version = wallet.version, "stale wallet version");
        return Err(WalletError::ConcurrentModification.into());
    }

    Ok(wallets::Model {
        balance: after.balance.minor(),
        available_balance: after.available.minor(),
        version: next_version,
        last_activity_at: Some(now),
        updated_at: now,
        ..wallet.clone()
    })
}

/// Finds a transaction by reference.
pub(crate) async fn find_transaction<C: ConnectionTrait>(
    conn: &C,
    reference: &str,
) -> StoreResult<Option<wallet_transactions::Model>> {
    Ok(wallet_transactions::Entity::find()
        .filter(wallet_transactions::Column::Reference.eq(reference))
        .one(conn)
        .await?)
}

/// The atomic posting primitive.
///
/// Locks the wallet, then resolves the reference:
/// - completed with the same parameters: replayed, nothing written;
/// - pending or processing with the same parameters: completed in place;
/// - closed, or used with different parameters: `DuplicateReference`;
/// - unknown: inserted as completed.
///
/// `balance` and `available_balance` both move by `amount - fee`.
pub(crate) async fn apply_in_txn<C: ConnectionTrait>(
    conn: &C,
    new: &NewTransaction,
    now: DateTime<Utc>,
) -> StoreResult<AppliedTransaction> {
    let net = net_amount(new.amount, new.fee)?;
    let wallet = lock_wallet(conn, new.wallet_id).await?;

    let open_row = match find_transaction(conn, &new.reference).await? {
        Some(row) if !new.matches(&row) => {
            return Err(WalletError::DuplicateReference(format!(
                "reference {} was already used for a different transaction",
                new.reference
            ))
            .into());
        }
        Some(row) => match TransactionStatus::from(row.status) {
            TransactionStatus::Completed => {
                tracing::debug!(reference = %new.reference, "replaying completed transaction");
                return Ok(AppliedTransaction {
                    transaction: row,
                    replayed: true,
                });
            }
            status @ (TransactionStatus::Failed | TransactionStatus::Cancelled) => {
                return Err(WalletError::DuplicateReference(format!(
                    "reference {} is already closed as {status}",
                    new.reference
                ))
                .into());
            }
            TransactionStatus::Pending | TransactionStatus::Processing => Some(row),
        },
        None => None,
    };

    if open_row.is_none() && !wallet.is_active {
        return Err(WalletError::WalletInactive(wallet.id.to_string()).into());
    }

    let posting = apply_net(wallet.snapshot()?, net)?;
    let updated = write_balances(conn, &wallet, posting.after, now).await?;

    let transaction = match open_row {
        Some(row) => complete_in_place(conn, row, new, &posting, updated.version, now).await?,
        None => {
            wallet_transactions::ActiveModel {
                id: Set(Uuid::now_v7()),
                wallet_id: Set(wallet.id),
                reference: Set(new.reference.clone()),
                kind: Set(new.kind.into()),
                amount: Set(new.amount.minor()),
                fee: Set(new.fee.minor()),
                net_amount: Set(net.minor()),
                balance_before: Set(Some(posting.before.balance.minor())),
                balance_after: Set(Some(posting.after.balance.minor())),
                posting_seq: Set(Some(updated.version)),
                status: Set(db_enums::TransactionStatus::Completed),
                counterparty_wallet_id: Set(new.counterparty.map(WalletId::into_inner)),
                description: Set(new.description.clone()),
                metadata: Set(new.metadata.clone()),
                hold_reference: Set(None),
                provider_reference: Set(None),
                reconciliation_required: Set(false),
                failure_reason: Set(None),
                completed_at: Set(Some(now)),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(conn)
            .await?
        }
    };

    tracing::debug!(
        wallet_id = %wallet.id,
        reference = %new.reference,
        amount = %new.amount,
        net = %net,
        balance = %posting.after.balance,
        "transaction applied"
    );

    Ok(AppliedTransaction {
        transaction,
        replayed: false,
    })
}

async fn complete_in_place<C: ConnectionTrait>(
    conn: &C,
    row: wallet_transactions::Model,
    new: &NewTransaction,
    posting: &Posting,
    posting_seq: i64,
    now: DateTime<Utc>,
) -> StoreResult<wallet_transactions::Model> {
    let status = TransactionStatus::from(row.status).transition(TransactionStatus::Completed)?;
    let metadata = new.metadata.clone().or_else(|| row.metadata.clone());

    // Guarded on the old status so a concurrent close cannot be overwritten.
    let result = wallet_transactions::Entity::update_many()
        .col_expr(
            wallet_transactions::Column::Status,
            Expr::value(db_enums::TransactionStatus::from(status)),
        )
        .col_expr(
            wallet_transactions::Column::BalanceBefore,
            Expr::value(posting.before.balance.minor()),
        )
        .col_expr(
            wallet_transactions::Column::BalanceAfter,
            Expr::value(posting.after.balance.minor()),
        )
        .col_expr(wallet_transactions::Column::PostingSeq, Expr::value(posting_seq))
        .col_expr(wallet_transactions::Column::Metadata, Expr::value(metadata.clone()))
        .col_expr(
            wallet_transactions::Column::ReconciliationRequired,
            Expr::value(false),
        )
        .col_expr(wallet_transactions::Column::CompletedAt, Expr::value(now))
        .col_expr(wallet_transactions::Column::UpdatedAt, Expr::value(now))
        .filter(wallet_transactions::Column::Id.eq(row.id))
        .filter(wallet_transactions::Column::Status.eq(row.status))
        .exec(conn)
        .await?;

    if result.rows_affected != 1 {
        return Err(WalletError::ConcurrentModification.into());
    }

    Ok(wallet_transactions::Model {
        status: status.into(),
        balance_before: Some(posting.before.balance.minor()),
        balance_after: Some(posting.after.balance.minor()),
        posting_seq: Some(posting_seq),
        metadata,
        reconciliation_required: false,
        completed_at: Some(now),
        updated_at: now,
        ..row
    })
}

/// Closes a pending or processing transaction as failed without touching
/// balances. Returns the row as stored afterwards; if another request closed
/// it first, that result is returned unchanged.
pub(crate) async fn fail_open_transaction<C: ConnectionTrait>(
    conn: &C,
    row: &wallet_transactions::Model,
    reason: &str,
    now: DateTime<Utc>,
) -> StoreResult<wallet_transactions::Model> {
    let result = wallet_transactions::Entity::update_many()
        .col_expr(
            wallet_transactions::Column::Status,
            Expr::value(db_enums::TransactionStatus::Failed),
        )
        .col_expr(wallet_transactions::Column::FailureReason, Expr::value(reason))
        .col_expr(
            wallet_transactions::Column::ReconciliationRequired,
            Expr::value(false),
        )
        .col_expr(wallet_transactions::Column::UpdatedAt, Expr::value(now))
        .filter(wallet_transactions::Column::Id.eq(row.id))
        .filter(wallet_transactions::Column::Status.is_in([
            db_enums::TransactionStatus::Pending,
            db_enums::TransactionStatus::Processing,
        ]))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        tracing::debug!(reference = %row.reference, "transaction already closed");
    } else {
        tracing::info!(reference = %row.reference, %reason, "transaction failed");
    }

    find_transaction(conn, &row.reference)
        .await?
        .ok_or_else(|| WalletError::TransactionNotFound(row.reference.clone()).into())
}

/// Flags an open transaction whose gateway call timed out.
pub(crate) async fn flag_for_reconciliation<C: ConnectionTrait>(
    conn: &C,
    reference: &str,
    now: DateTime<Utc>,
) -> StoreResult<()> {
    wallet_transactions::Entity::update_many()
        .col_expr(
            wallet_transactions::Column::ReconciliationRequired,
            Expr::value(true),
        )
        .col_expr(wallet_transactions::Column::UpdatedAt, Expr::value(now))
        .filter(wallet_transactions::Column::Reference.eq(reference))
        .filter(wallet_transactions::Column::Status.is_in([
            db_enums::TransactionStatus::Pending,
            db_enums::TransactionStatus::Processing,
        ]))
        .exec(conn)
        .await?;
    tracing::warn!(%reference, "gateway timed out, flagged for reconciliation");
    Ok(())
}

/// Spend of `wallet` in the day and month windows containing `now`.
pub(crate) async fn spend_totals<C: ConnectionTrait>(
    conn: &C,
    wallet: &wallets::Model,
    now: DateTime<Utc>,
) -> StoreResult<(SpendWindows, SpendTotals)> {
    let tz = parse_timezone(&wallet.timezone)?;
    let windows = SpendWindows::at(now, tz)?;

    let rows = wallet_transactions::Entity::find()
        .filter(wallet_transactions::Column::WalletId.eq(wallet.id))
        .filter(wallet_transactions::Column::Status.eq(db_enums::TransactionStatus::Completed))
        .filter(wallet_transactions::Column::Amount.lt(0))
        .filter(wallet_transactions::Column::CompletedAt.gte(windows.month_start))
        .filter(wallet_transactions::Column::CompletedAt.lt(windows.month_end))
        .all(conn)
        .await?;

    let records: Vec<SpendRecord> = rows
        .iter()
        .map(|row| SpendRecord {
            kind: row.kind.into(),
            amount: row.amount(),
            status: row.status.into(),
            completed_at: row.completed_at,
        })
        .collect();

    Ok((windows, SpendTotals::from_records(&records, &windows)))
}

/// Reserves funds and inserts an active hold. Placing the same reference
/// again with the same parameters returns the stored hold.
pub(crate) async fn place_hold_in_txn<C: ConnectionTrait>(
    conn: &C,
    new: &NewHold,
    now: DateTime<Utc>,
) -> StoreResult<holds::Model> {
    let expires_at = validate_hold(new.amount, new.ttl, now)?;
    let wallet = lock_wallet(conn, new.wallet_id).await?;

    if let Some(existing) = holds::Entity::find()
        .filter(holds::Column::Reference.eq(&new.reference))
        .one(conn)
        .await?
    {
        let same = existing.wallet_id == wallet.id
            && existing.amount == new.amount.minor()
            && HoldReason::from(existing.reason) == new.reason;
        if same {
            return Ok(existing);
        }
        return Err(WalletError::DuplicateReference(format!(
            "hold reference {} was already used",
            new.reference
        ))
        .into());
    }

    if !wallet.is_active {
        return Err(WalletError::WalletInactive(wallet.id.to_string()).into());
    }

    let after = reserve(wallet.snapshot()?, new.amount)?;
    write_balances(conn, &wallet, after, now).await?;

    let hold = holds::ActiveModel {
        id: Set(Uuid::now_v7()),
        wallet_id: Set(wallet.id),
        amount: Set(new.amount.minor()),
        reason: Set(new.reason.into()),
        reference: Set(new.reference.clone()),
        expires_at: Set(expires_at),
        released_at: Set(None),
        release_reason: Set(None),
        created_at: Set(now),
    }
    .insert(conn)
    .await?;

    tracing::info!(
        wallet_id = %wallet.id,
        reference = %hold.reference,
        amount = %new.amount,
        %expires_at,
        "hold placed"
    );
    Ok(hold)
}

/// Releases a hold exactly once.
///
/// The release is a conditional update on `released_at IS NULL`, so a
/// manual release racing the expiry sweep credits `available_balance` once.
pub(crate) async fn release_hold_in_txn<C: ConnectionTrait>(
    conn: &C,
    reference: &str,
    reason: ReleaseReason,
    now: DateTime<Utc>,
) -> StoreResult<HoldRelease> {
    let hold = holds::Entity::find()
        .filter(holds::Column::Reference.eq(reference))
        .one(conn)
        .await?
        .ok_or_else(|| WalletError::HoldNotFound(reference.to_string()))?;

    if hold.released_at.is_some() {
        return Ok(HoldRelease::AlreadyReleased(hold));
    }

    let wallet = lock_wallet(conn, WalletId::from_uuid(hold.wallet_id)).await?;

    let result = holds::Entity::update_many()
        .col_expr(holds::Column::ReleasedAt, Expr::value(now))
        .col_expr(holds::Column::ReleaseReason, Expr::value(reason.as_str()))
        .filter(holds::Column::Id.eq(hold.id))
        .filter(holds::Column::ReleasedAt.is_null())
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        let current = holds::Entity::find_by_id(hold.id)
            .one(conn)
            .await?
            .ok_or_else(|| WalletError::HoldNotFound(reference.to_string()))?;
        return Ok(HoldRelease::AlreadyReleased(current));
    }

    let after = unreserve(wallet.snapshot()?, Money::from_minor(hold.amount))?;
    write_balances(conn, &wallet, after, now).await?;

    tracing::info!(
        wallet_id = %wallet.id,
        %reference,
        reason = reason.as_str(),
        amount = hold.amount,
        "hold released"
    );

    Ok(HoldRelease::Released(holds::Model {
        released_at: Some(now),
        release_reason: Some(reason.as_str().to_string()),
        ..hold
    }))
}

/// Stored on payouts whose hold expired without a gateway report.
pub const SETTLEMENT_TIMED_OUT: &str = "settlement timed out";

/// Stored on payouts whose hold was cancelled before settlement.
pub const HOLD_CANCELLED: &str = "hold cancelled before settlement";

/// Result of releasing a hold outside the settlement path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleasedHold {
    /// The release itself.
    pub release: HoldRelease,
    /// The payout the hold backed, if this call closed it as failed.
    pub failed_payout: Option<wallet_transactions::Model>,
}

/// Releases a hold and fails the processing payout that owns it in the same
/// unit of work. A payout row must never outlive its hold.
pub(crate) async fn release_and_close_in_txn<C: ConnectionTrait>(
    conn: &C,
    reference: &str,
    reason: ReleaseReason,
    now: DateTime<Utc>,
) -> StoreResult<ReleasedHold> {
    let release = release_hold_in_txn(conn, reference, reason, now).await?;
    let HoldRelease::Released(_) = &release else {
        return Ok(ReleasedHold {
            release,
            failed_payout: None,
        });
    };

    let owner = wallet_transactions::Entity::find()
        .filter(wallet_transactions::Column::HoldReference.eq(reference))
        .filter(wallet_transactions::Column::Status.eq(db_enums::TransactionStatus::Processing))
        .one(conn)
        .await?;
    let failed_payout = match owner {
        Some(row) => {
            let failure = match reason {
                ReleaseReason::Expired => SETTLEMENT_TIMED_OUT,
                _ => HOLD_CANCELLED,
            };
            Some(fail_open_transaction(conn, &row, failure, now).await?)
        }
        None => None,
    };

    Ok(ReleasedHold {
        release,
        failed_payout,
    })
}

/// Sum of unreleased holds on a wallet.
pub(crate) async fn active_hold_total<C: ConnectionTrait>(
    conn: &C,
    wallet_id: Uuid,
) -> StoreResult<Money> {
    let rows = holds::Entity::find()
        .filter(holds::Column::WalletId.eq(wallet_id))
        .filter(holds::Column::ReleasedAt.is_null())
        .all(conn)
        .await?;
    Ok(rows.iter().map(|h| Money::from_minor(h.amount)).sum())
}

/// Holds past expiry that are still unreleased, oldest first.
pub(crate) async fn expired_holds<C: ConnectionTrait>(
    conn: &C,
    now: DateTime<Utc>,
    limit: u64,
) -> StoreResult<Vec<holds::Model>> {
    Ok(holds::Entity::find()
        .filter(holds::Column::ReleasedAt.is_null())
        .filter(holds::Column::ExpiresAt.lt(now))
        .order_by_asc(holds::Column::ExpiresAt)
        .limit(limit)
        .all(conn)
        .await?)
}
