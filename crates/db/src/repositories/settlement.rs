//! External settlement: funding through a charge, withdrawals and bill
//! payments through a held payout.
//!
//! Gateway calls never run inside a unit of work. The store records intent
//! first (a pending funding row, or a hold plus a processing payout row),
//! calls the gateway, then finalizes in a second unit of work keyed by the
//! same reference. A gateway timeout flags the row for reconciliation and
//! leaves it open; the outcome is never guessed.

use std::sync::Arc;
use std::time::Duration;

use campuspay_core::WalletError;
use campuspay_core::fees::{FeeKind, FeePolicy};
use campuspay_core::holds::{HoldReason, ReleaseReason};
use campuspay_core::limits::{SpendCaps, check_limits};
use campuspay_core::security::AttemptLimiter;
use campuspay_core::settlement::{
    ChargeRequest, ChargeVerification, FundingDecision, GatewayError, PaymentGateway,
    PayoutDecision, PayoutDestination, PayoutPlan, PayoutRequest, decide_funding, decide_payout,
    with_timeout,
};
use campuspay_core::wallet::reference::generate as generate_reference;
use campuspay_core::wallet::{
    Leg, ReferencePrefix, TransactionKind, TransactionStatus, leg_reference, net_amount,
    validate_reference,
};
use campuspay_shared::config::AppConfig;
use campuspay_shared::types::{Currency, Money, UserId, WalletId};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use serde::Serialize;
use uuid::Uuid;

use super::ledger::{
    HoldRelease, NewHold, NewTransaction, apply_in_txn, expired_holds, fail_open_transaction,
    fee_sink, find_transaction, find_wallet_by_owner, flag_for_reconciliation, lock_wallet,
    lock_wallets, place_hold_in_txn, release_and_close_in_txn, release_hold_in_txn, spend_totals,
};
use crate::entities::{sea_orm_active_enums as db_enums, wallet_transactions};
use crate::error::StoreResult;

/// Settlement parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementOptions {
    /// Currency of every charge and payout.
    pub currency: Currency,
    /// Lifetime of payout holds.
    pub hold_ttl: chrono::Duration,
    /// Bound on every gateway call.
    pub gateway_timeout: Duration,
    /// Owner of the fee-sink wallet.
    pub fee_sink_owner: UserId,
    /// Rows handled per worker pass.
    pub batch_size: u64,
}

impl SettlementOptions {
    /// Builds options from the application config.
    pub fn from_config(config: &AppConfig) -> Result<Self, WalletError> {
        let currency = config
            .ledger
            .currency
            .parse::<Currency>()
            .map_err(WalletError::InvalidRequest)?;
        let hold_ttl = i64::try_from(config.ledger.hold_ttl_secs)
            .map(chrono::Duration::seconds)
            .map_err(|_| WalletError::InvalidRequest("hold ttl out of range".to_string()))?;
        Ok(Self {
            currency,
            hold_ttl,
            gateway_timeout: Duration::from_secs(config.gateway.timeout_secs),
            fee_sink_owner: UserId::from_uuid(config.ledger.fee_wallet_owner),
            batch_size: config.settlement.payout_batch,
        })
    }
}

/// Request to fund a wallet.
#[derive(Debug, Clone)]
pub struct FundingCommand {
    /// Owner of the wallet to credit.
    pub owner: UserId,
    /// Amount to charge.
    pub amount: Money,
    /// Payer email for the provider checkout.
    pub email: String,
    /// Caller-supplied reference; generated when absent.
    pub reference: Option<String>,
}

/// A started funding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FundingInit {
    /// Ledger reference; pass it to `verify_funding`.
    pub reference: String,
    /// Amount charged.
    pub amount: Money,
    /// Fee deducted on credit.
    pub fee: Money,
    /// Handle the payer completes the charge with.
    pub authorization_handle: String,
    /// Provider reference.
    pub external_reference: String,
}

/// Request to move money out through the gateway.
#[derive(Debug, Clone)]
pub struct PayoutCommand {
    /// Paying owner.
    pub owner: UserId,
    /// Wallet PIN.
    pub pin: String,
    /// Amount paid out, fee excluded.
    pub amount: Money,
    /// Bank account or biller.
    pub destination: PayoutDestination,
    /// Caller-supplied reference; generated when absent.
    pub reference: Option<String>,
    /// Description stored on the row.
    pub description: Option<String>,
}

/// A payout accepted for settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayoutReceipt {
    /// Ledger reference.
    pub reference: String,
    /// Amount paid out.
    pub amount: Money,
    /// Fee charged on settlement.
    pub fee: Money,
    /// Amount reserved until settlement.
    pub hold_amount: Money,
    /// Current status of the payout row.
    pub status: TransactionStatus,
    /// Available balance right after the hold was placed.
    pub available_balance: Money,
    /// True when the reference had already been accepted.
    pub replayed: bool,
}

/// Counters of one payout worker pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PayoutSweep {
    /// Debits applied.
    pub settled: usize,
    /// Payouts closed as failed.
    pub failed: usize,
    /// Still running at the provider.
    pub in_flight: usize,
    /// Gateway calls that timed out.
    pub timed_out: usize,
    /// Rows that hit an error and stay for the next pass.
    pub errors: usize,
}

/// Counters of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Expired holds released.
    pub expired_holds: usize,
    /// Payouts failed because their hold expired.
    pub timed_out_payouts: usize,
    /// Flagged funding rows verified again.
    pub reverified_funding: usize,
}

enum PayoutOutcome {
    Settled,
    Failed,
    InFlight,
    TimedOut,
}

/// Drives funding and payouts through the payment gateway.
#[derive(Clone)]
pub struct SettlementService {
    db: DatabaseConnection,
    gateway: Arc<dyn PaymentGateway>,
    fees: FeePolicy,
    limiter: AttemptLimiter,
    options: SettlementOptions,
}

impl std::fmt::Debug for SettlementService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementService")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl SettlementService {
    /// Creates a settlement service.
    #[must_use]
    pub fn new(
        db: DatabaseConnection,
        gateway: Arc<dyn PaymentGateway>,
        fees: FeePolicy,
        limiter: AttemptLimiter,
        options: SettlementOptions,
    ) -> Self {
        Self {
            db,
            gateway,
            fees,
            limiter,
            options,
        }
    }

    // ========================================================================
    // Funding
    // ========================================================================

    /// Records a pending funding row and initializes the external charge.
    pub async fn initialize_funding(&self, cmd: FundingCommand) -> StoreResult<FundingInit> {
        if !cmd.amount.is_positive() {
            return Err(WalletError::InvalidAmount("funding amount must be positive".to_string()).into());
        }
        let reference = match cmd.reference {
            Some(reference) => reference,
            None => generate_reference(ReferencePrefix::Funding),
        };
        validate_reference(&reference)?;

        let fee = self.fees.compute_fee(FeeKind::Deposit, cmd.amount, None)?;
        let net = net_amount(cmd.amount, fee)?;

        let wallet = find_wallet_by_owner(&self.db, cmd.owner)
            .await?
            .ok_or_else(|| WalletError::WalletNotFound(format!("no wallet for owner {}", cmd.owner)))?;
        if !wallet.is_active {
            return Err(WalletError::WalletInactive(wallet.id.to_string()).into());
        }

        let now = Utc::now();
        match find_transaction(&self.db, &reference).await? {
            Some(row) => {
                let same = row.wallet_id == wallet.id
                    && row.kind == db_enums::TransactionKind::Deposit
                    && row.amount == cmd.amount.minor();
                if !same {
                    return Err(WalletError::DuplicateReference(format!(
                        "reference {reference} was already used for a different transaction"
                    ))
                    .into());
                }
                if row.status != db_enums::TransactionStatus::Pending {
                    return Err(WalletError::DuplicateReference(format!(
                        "funding {reference} is already {}",
                        TransactionStatus::from(row.status)
                    ))
                    .into());
                }
            }
            None => {
                wallet_transactions::ActiveModel {
                    id: Set(Uuid::now_v7()),
                    wallet_id: Set(wallet.id),
                    reference: Set(reference.clone()),
                    kind: Set(db_enums::TransactionKind::Deposit),
                    amount: Set(cmd.amount.minor()),
                    fee: Set(fee.minor()),
                    net_amount: Set(net.minor()),
                    balance_before: Set(None),
                    balance_after: Set(None),
                    posting_seq: Set(None),
                    status: Set(db_enums::TransactionStatus::Pending),
                    counterparty_wallet_id: Set(None),
                    description: Set(Some("wallet funding".to_string())),
                    metadata: Set(Some(serde_json::json!({ "email": cmd.email }))),
                    hold_reference: Set(None),
                    provider_reference: Set(None),
                    reconciliation_required: Set(false),
                    failure_reason: Set(None),
                    completed_at: Set(None),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&self.db)
                .await?;
            }
        }

        let request = ChargeRequest {
            reference: reference.clone(),
            amount: cmd.amount,
            currency: self.options.currency,
            email: cmd.email,
            metadata: serde_json::json!({ "wallet_id": wallet.id }),
        };
        let init = match with_timeout(
            self.options.gateway_timeout,
            &reference,
            self.gateway.initialize_charge(&request),
        )
        .await
        {
            Ok(init) => init,
            Err(err @ GatewayError::Timeout(_)) => {
                return Err(self.gateway_failure(&reference, err).await);
            }
            Err(err) => {
                if let Some(row) = find_transaction(&self.db, &reference).await? {
                    fail_open_transaction(&self.db, &row, &err.to_string(), Utc::now()).await?;
                }
                return Err(self.gateway_failure(&reference, err).await);
            }
        };

        wallet_transactions::Entity::update_many()
            .col_expr(
                wallet_transactions::Column::ProviderReference,
                Expr::value(init.external_reference.clone()),
            )
            .col_expr(wallet_transactions::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(wallet_transactions::Column::Reference.eq(&reference))
            .exec(&self.db)
            .await?;

        tracing::info!(%reference, wallet_id = %wallet.id, amount = %cmd.amount, "funding initialized");
        Ok(FundingInit {
            reference,
            amount: cmd.amount,
            fee,
            authorization_handle: init.authorization_handle,
            external_reference: init.external_reference,
        })
    }

    /// Verifies a funding with the gateway and applies the outcome.
    ///
    /// A terminal funding returns its stored row untouched, so verifying
    /// twice never credits twice.
    pub async fn verify_funding(
        &self,
        owner: UserId,
        reference: &str,
    ) -> StoreResult<wallet_transactions::Model> {
        let row = find_transaction(&self.db, reference)
            .await?
            .ok_or_else(|| WalletError::TransactionNotFound(reference.to_string()))?;
        let wallet = find_wallet_by_owner(&self.db, owner).await?;
        if wallet.is_none_or(|w| w.id != row.wallet_id)
            || row.kind != db_enums::TransactionKind::Deposit
        {
            return Err(WalletError::TransactionNotFound(reference.to_string()).into());
        }
        self.verify_funding_row(row, Utc::now()).await
    }

    async fn verify_funding_row(
        &self,
        row: wallet_transactions::Model,
        now: DateTime<Utc>,
    ) -> StoreResult<wallet_transactions::Model> {
        if TransactionStatus::from(row.status).is_terminal() {
            return Ok(row);
        }

        let verification = match with_timeout(
            self.options.gateway_timeout,
            &row.reference,
            self.gateway.verify_charge(&row.reference),
        )
        .await
        {
            Ok(verification) => verification,
            Err(err) => return Err(self.gateway_failure(&row.reference, err).await),
        };

        match decide_funding(row.amount(), &verification) {
            FundingDecision::Credit => self.credit_funding(&row, &verification, now).await,
            FundingDecision::Fail { reason } => {
                Ok(fail_open_transaction(&self.db, &row, &reason, now).await?)
            }
            FundingDecision::StillPending => Ok(row),
        }
    }

    async fn credit_funding(
        &self,
        row: &wallet_transactions::Model,
        verification: &ChargeVerification,
        now: DateTime<Utc>,
    ) -> StoreResult<wallet_transactions::Model> {
        let wallet_id = WalletId::from_uuid(row.wallet_id);
        let fee = row.fee();
        let metadata = serde_json::json!({
            "channel": verification.channel,
            "gateway": verification.raw,
        });

        let txn = self.db.begin().await?;
        let sink = fee_sink(&txn, self.options.fee_sink_owner).await?;
        lock_wallets(&txn, &[wallet_id, sink.wallet_id()]).await?;

        let credit = NewTransaction::new(wallet_id, &row.reference, TransactionKind::Deposit, row.amount())
            .with_fee(fee)
            .with_metadata(metadata);
        let applied = apply_in_txn(&txn, &credit, now).await?;
        if !applied.replayed && fee.is_positive() {
            let fee_leg = NewTransaction::new(
                sink.wallet_id(),
                leg_reference(&row.reference, Leg::Fee),
                TransactionKind::Fee,
                fee,
            )
            .with_counterparty(wallet_id)
            .with_description(Some(format!("deposit fee for {}", row.reference)));
            apply_in_txn(&txn, &fee_leg, now).await?;
        }
        txn.commit().await?;

        tracing::info!(reference = %row.reference, wallet_id = %wallet_id, net = %row.net(), "funding credited");
        Ok(applied.transaction)
    }

    // ========================================================================
    // Payouts
    // ========================================================================

    /// Places a hold for a withdrawal and queues the payout.
    pub async fn withdraw(&self, cmd: PayoutCommand) -> StoreResult<PayoutReceipt> {
        if !matches!(cmd.destination, PayoutDestination::BankAccount { .. }) {
            return Err(WalletError::InvalidRequest(
                "withdrawals need a bank account destination".to_string(),
            )
            .into());
        }
        self.start_payout(HoldReason::Withdrawal, cmd, Utc::now()).await
    }

    /// Places a hold for a bill payment and queues the payout.
    pub async fn pay_bill(&self, cmd: PayoutCommand) -> StoreResult<PayoutReceipt> {
        if !matches!(cmd.destination, PayoutDestination::Biller { .. }) {
            return Err(WalletError::InvalidRequest(
                "bill payments need a biller destination".to_string(),
            )
            .into());
        }
        self.start_payout(HoldReason::BillPayment, cmd, Utc::now()).await
    }

    async fn start_payout(
        &self,
        reason: HoldReason,
        cmd: PayoutCommand,
        now: DateTime<Utc>,
    ) -> StoreResult<PayoutReceipt> {
        if !cmd.amount.is_positive() {
            return Err(WalletError::InvalidAmount("payout amount must be positive".to_string()).into());
        }
        let prefix = match reason {
            HoldReason::Withdrawal => ReferencePrefix::Withdrawal,
            HoldReason::BillPayment => ReferencePrefix::Bill,
        };
        let reference = match cmd.reference {
            Some(reference) => reference,
            None => generate_reference(prefix),
        };
        validate_reference(&reference)?;
        let plan = PayoutPlan::new(reason, cmd.amount, &self.fees)?;

        let wallet = find_wallet_by_owner(&self.db, cmd.owner)
            .await?
            .ok_or_else(|| WalletError::WalletNotFound(format!("no wallet for owner {}", cmd.owner)))?;
        self.limiter.verify(cmd.owner, &cmd.pin, &wallet.pin_hash)?;

        let txn = self.db.begin().await?;
        let wallet = lock_wallet(&txn, wallet.wallet_id()).await?;

        if let Some(row) = find_transaction(&txn, &reference).await? {
            let same = row.wallet_id == wallet.id
                && TransactionKind::from(row.kind) == plan.kind
                && row.amount == plan.debit_amount().minor();
            if !same {
                return Err(WalletError::DuplicateReference(format!(
                    "reference {reference} was already used for a different transaction"
                ))
                .into());
            }
            tracing::info!(%reference, "replaying accepted payout");
            return Ok(PayoutReceipt {
                reference,
                amount: plan.amount,
                fee: row.fee(),
                hold_amount: plan.hold_amount,
                status: row.status.into(),
                available_balance: Money::from_minor(wallet.available_balance),
                replayed: true,
            });
        }

        if !wallet.is_active {
            return Err(WalletError::WalletInactive(wallet.id.to_string()).into());
        }
        let available = Money::from_minor(wallet.available_balance);
        if available < plan.hold_amount {
            return Err(WalletError::InsufficientFunds {
                available,
                required: plan.hold_amount,
            }
            .into());
        }
        let (_, spent) = spend_totals(&txn, &wallet, now).await?;
        let caps = SpendCaps {
            daily: Money::from_minor(wallet.daily_limit),
            monthly: Money::from_minor(wallet.monthly_limit),
        };
        check_limits(&caps, &spent, plan.amount)?;

        let hold_reference = leg_reference(&reference, Leg::Hold);
        place_hold_in_txn(
            &txn,
            &NewHold {
                wallet_id: wallet.wallet_id(),
                amount: plan.hold_amount,
                reason,
                reference: hold_reference.clone(),
                ttl: self.options.hold_ttl,
            },
            now,
        )
        .await?;

        let debit = plan.debit_amount();
        let net = net_amount(debit, plan.fee)?;
        wallet_transactions::ActiveModel {
            id: Set(Uuid::now_v7()),
            wallet_id: Set(wallet.id),
            reference: Set(reference.clone()),
            kind: Set(plan.kind.into()),
            amount: Set(debit.minor()),
            fee: Set(plan.fee.minor()),
            net_amount: Set(net.minor()),
            balance_before: Set(None),
            balance_after: Set(None),
            posting_seq: Set(None),
            status: Set(db_enums::TransactionStatus::Processing),
            counterparty_wallet_id: Set(None),
            description: Set(cmd.description),
            metadata: Set(Some(serde_json::json!({ "destination": cmd.destination }))),
            hold_reference: Set(Some(hold_reference)),
            provider_reference: Set(None),
            reconciliation_required: Set(false),
            failure_reason: Set(None),
            completed_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        tracing::info!(
            %reference,
            wallet_id = %wallet.id,
            amount = %plan.amount,
            hold = %plan.hold_amount,
            "payout accepted"
        );

        Ok(PayoutReceipt {
            reference,
            amount: plan.amount,
            fee: plan.fee,
            hold_amount: plan.hold_amount,
            status: TransactionStatus::Processing,
            available_balance: available - plan.hold_amount,
            replayed: false,
        })
    }

    /// Drives up to `batch` processing payouts through the gateway.
    pub async fn process_payouts(&self, batch: u64) -> StoreResult<PayoutSweep> {
        let rows = wallet_transactions::Entity::find()
            .filter(wallet_transactions::Column::Status.eq(db_enums::TransactionStatus::Processing))
            .filter(wallet_transactions::Column::HoldReference.is_not_null())
            .order_by_asc(wallet_transactions::Column::CreatedAt)
            .limit(batch)
            .all(&self.db)
            .await?;

        let mut sweep = PayoutSweep::default();
        for row in rows {
            match self.drive_payout(&row).await {
                Ok(PayoutOutcome::Settled) => sweep.settled += 1,
                Ok(PayoutOutcome::Failed) => sweep.failed += 1,
                Ok(PayoutOutcome::InFlight) => sweep.in_flight += 1,
                Ok(PayoutOutcome::TimedOut) => sweep.timed_out += 1,
                Err(err) => {
                    tracing::warn!(reference = %row.reference, error = %err, "payout left for next pass");
                    sweep.errors += 1;
                }
            }
        }
        if sweep != PayoutSweep::default() {
            tracing::info!(?sweep, "payout pass finished");
        }
        Ok(sweep)
    }

    async fn drive_payout(&self, row: &wallet_transactions::Model) -> StoreResult<PayoutOutcome> {
        let destination = row
            .metadata
            .as_ref()
            .and_then(|m| m.get("destination"))
            .cloned()
            .and_then(|d| serde_json::from_value::<PayoutDestination>(d).ok())
            .ok_or_else(|| {
                WalletError::InvariantViolation(format!("payout {} has no destination", row.reference))
            })?;
        let request = PayoutRequest {
            reference: row.reference.clone(),
            amount: row.amount().abs(),
            currency: self.options.currency,
            destination,
        };

        let result = match with_timeout(
            self.options.gateway_timeout,
            &row.reference,
            self.gateway.initiate_payout(&request),
        )
        .await
        {
            Ok(result) => result,
            Err(GatewayError::Timeout(_)) => {
                flag_for_reconciliation(&self.db, &row.reference, Utc::now()).await?;
                return Ok(PayoutOutcome::TimedOut);
            }
            Err(err) => return Err(WalletError::from(err).into()),
        };

        let now = Utc::now();
        match decide_payout(&result) {
            PayoutDecision::Settle { provider_reference } => {
                self.settle_payout(row, provider_reference, now).await?;
                Ok(PayoutOutcome::Settled)
            }
            PayoutDecision::Fail { reason } => {
                self.fail_payout(row, ReleaseReason::Failed, &reason, now).await?;
                Ok(PayoutOutcome::Failed)
            }
            PayoutDecision::InFlight => Ok(PayoutOutcome::InFlight),
        }
    }

    async fn settle_payout(
        &self,
        row: &wallet_transactions::Model,
        provider_reference: Option<String>,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let wallet_id = WalletId::from_uuid(row.wallet_id);
        let hold_reference = row.hold_reference.clone().ok_or_else(|| {
            WalletError::InvariantViolation(format!("payout {} has no hold", row.reference))
        })?;

        let txn = self.db.begin().await?;
        let sink = fee_sink(&txn, self.options.fee_sink_owner).await?;
        lock_wallets(&txn, &[wallet_id, sink.wallet_id()]).await?;

        if let HoldRelease::AlreadyReleased(_) =
            release_hold_in_txn(&txn, &hold_reference, ReleaseReason::Settled, now).await?
        {
            let current = find_transaction(&txn, &row.reference).await?;
            return match current.map(|r| TransactionStatus::from(r.status)) {
                Some(TransactionStatus::Completed) => Ok(()),
                Some(status) if status.is_terminal() => {
                    tracing::error!(
                        alert = true,
                        reference = %row.reference,
                        %status,
                        "gateway paid out a payout already closed locally"
                    );
                    Ok(())
                }
                _ => Err(WalletError::InvariantViolation(format!(
                    "payout {} is open but its hold is released",
                    row.reference
                ))
                .into()),
            };
        }

        let debit = NewTransaction::new(wallet_id, &row.reference, row.kind.into(), row.amount())
            .with_fee(row.fee());
        apply_in_txn(&txn, &debit, now).await?;

        let fee = row.fee();
        if fee.is_positive() {
            let fee_leg = NewTransaction::new(
                sink.wallet_id(),
                leg_reference(&row.reference, Leg::Fee),
                TransactionKind::Fee,
                fee,
            )
            .with_counterparty(wallet_id)
            .with_description(Some(format!("payout fee for {}", row.reference)));
            apply_in_txn(&txn, &fee_leg, now).await?;
        }

        if let Some(provider_reference) = provider_reference {
            set_provider_reference(&txn, &row.reference, &provider_reference, now).await?;
        }
        txn.commit().await?;

        tracing::info!(reference = %row.reference, %wallet_id, "payout settled");
        Ok(())
    }

    async fn fail_payout(
        &self,
        row: &wallet_transactions::Model,
        release: ReleaseReason,
        reason: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<wallet_transactions::Model> {
        let txn = self.db.begin().await?;
        if let Some(hold_reference) = &row.hold_reference {
            release_hold_in_txn(&txn, hold_reference, release, now).await?;
        }
        let failed = fail_open_transaction(&txn, row, reason, now).await?;
        txn.commit().await?;
        Ok(failed)
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    /// Releases expired holds, failing the payouts that owned them, and
    /// re-verifies funding rows flagged after a gateway timeout.
    pub async fn reconcile(&self, now: DateTime<Utc>) -> StoreResult<ReconcileReport> {
        let mut report = ReconcileReport::default();

        for hold in expired_holds(&self.db, now, self.options.batch_size).await? {
            let txn = self.db.begin().await?;
            let outcome =
                release_and_close_in_txn(&txn, &hold.reference, ReleaseReason::Expired, now)
                    .await?;
            txn.commit().await?;

            if outcome.release.is_released() {
                report.expired_holds += 1;
                if outcome.failed_payout.is_some() {
                    report.timed_out_payouts += 1;
                }
                tracing::warn!(hold = %hold.reference, "hold expired without settlement");
            }
        }

        let flagged = wallet_transactions::Entity::find()
            .filter(wallet_transactions::Column::Status.eq(db_enums::TransactionStatus::Pending))
            .filter(wallet_transactions::Column::Kind.eq(db_enums::TransactionKind::Deposit))
            .filter(wallet_transactions::Column::ReconciliationRequired.eq(true))
            .order_by_asc(wallet_transactions::Column::CreatedAt)
            .limit(self.options.batch_size)
            .all(&self.db)
            .await?;
        for row in flagged {
            let reference = row.reference.clone();
            match self.verify_funding_row(row, now).await {
                Ok(_) => report.reverified_funding += 1,
                Err(err) => tracing::warn!(%reference, error = %err, "funding still unreconciled"),
            }
        }

        Ok(report)
    }

    /// Turns a gateway error into the caller's error. A timeout flags the row
    /// for reconciliation.
    async fn gateway_failure(&self, reference: &str, err: GatewayError) -> crate::error::StoreError {
        if matches!(err, GatewayError::Timeout(_)) {
            if let Err(flag_err) = flag_for_reconciliation(&self.db, reference, Utc::now()).await {
                return flag_err;
            }
        } else {
            tracing::warn!(%reference, error = %err, "gateway call failed");
        }
        WalletError::from(err).into()
    }
}

async fn set_provider_reference<C: ConnectionTrait>(
    conn: &C,
    reference: &str,
    provider_reference: &str,
    now: DateTime<Utc>,
) -> StoreResult<()> {
    wallet_transactions::Entity::update_many()
        .col_expr(
            wallet_transactions::Column::ProviderReference,
            Expr::value(provider_reference),
        )
        .col_expr(wallet_transactions::Column::UpdatedAt, Expr::value(now))
        .filter(wallet_transactions::Column::Reference.eq(reference))
        .exec(conn)
        .await?;
    Ok(())
}
