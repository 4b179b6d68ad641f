//! Transfer engine execution: peer transfers, merchant payments and QR
//! payments as one atomic unit of work each.
//!
//! Flow per request:
//! 1. load the sender and verify the PIN (outside the unit of work);
//! 2. resolve the recipient and the fee sink;
//! 3. lock all wallets in ascending id order;
//! 4. replay if the debit leg of the base reference already exists;
//! 5. plan (balance, limits, recipient, fee) and apply every leg;
//! 6. commit, then update the recipients cache best-effort.
//!
//! Steps 3 to 6 start over when they lose a lock or version race.

use campuspay_core::WalletError;
use campuspay_core::fees::bps_to_rate;
use campuspay_core::limits::SpendCaps;
use campuspay_core::qr::QrPayment;
use campuspay_core::security::AttemptLimiter;
use campuspay_core::transfer::{
    PartyState, RecipientSelector, TransferChannel, TransferContext, TransferPlanner,
    TransferRequest,
};
use campuspay_core::wallet::reference::generate as generate_reference;
use campuspay_core::wallet::{
    Leg, ReferencePrefix, TransactionKind, leg_reference, validate_reference,
};
use campuspay_shared::types::{Money, UserId, WalletId};
use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, TransactionTrait};
use serde::Serialize;

use super::ledger::{
    NewTransaction, apply_in_txn, fee_sink, find_transaction, find_wallet_by_owner, lock_wallets,
    retry_contended, spend_totals,
};
use super::recipient::RecipientRepository;
use crate::entities::{merchants, wallets};
use crate::error::StoreResult;

/// A money movement requested by a wallet owner.
#[derive(Debug, Clone)]
pub struct TransferCommand {
    /// Paying owner.
    pub sender: UserId,
    /// Wallet PIN.
    pub pin: String,
    /// Who gets paid.
    pub recipient: RecipientSelector,
    /// Amount debited from the sender.
    pub amount: Money,
    /// Caller-supplied base reference; generated when absent.
    pub reference: Option<String>,
    /// Description stored on every leg.
    pub description: Option<String>,
}

/// Result of a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferReceipt {
    /// Base reference.
    pub reference: String,
    /// Amount debited from the sender.
    pub amount: Money,
    /// Fee credited to the fee sink.
    pub fee: Money,
    /// Amount the recipient received.
    pub net_amount: Money,
    /// Sender balance after the debit.
    pub sender_balance: Money,
    /// Recipient wallet.
    pub recipient_wallet_id: WalletId,
    /// True when the reference had already been executed.
    pub replayed: bool,
}

/// Executes transfers against the store.
#[derive(Debug, Clone)]
pub struct TransferService {
    db: DatabaseConnection,
    planner: TransferPlanner,
    limiter: AttemptLimiter,
    fee_sink_owner: UserId,
}

struct ResolvedRecipient {
    wallet: Option<wallets::Model>,
    channel: TransferChannel,
}

impl TransferService {
    /// Creates a transfer service.
    #[must_use]
    pub fn new(
        db: DatabaseConnection,
        planner: TransferPlanner,
        limiter: AttemptLimiter,
        fee_sink_owner: UserId,
    ) -> Self {
        Self {
            db,
            planner,
            limiter,
            fee_sink_owner,
        }
    }

    /// Transfers to a user id, contact handle or merchant.
    pub async fn transfer(&self, cmd: TransferCommand) -> StoreResult<TransferReceipt> {
        let prefix = match cmd.recipient {
            RecipientSelector::Merchant(_) => ReferencePrefix::Merchant,
            RecipientSelector::UserId(_) | RecipientSelector::Handle(_) => {
                ReferencePrefix::Transfer
            }
        };
        let base = match &cmd.reference {
            Some(reference) => reference.clone(),
            None => generate_reference(prefix),
        };
        self.execute(cmd, base, Utc::now()).await
    }

    /// Pays a merchant. Same as [`Self::transfer`] with a merchant selector.
    pub async fn pay_merchant(&self, cmd: TransferCommand) -> StoreResult<TransferReceipt> {
        if !matches!(cmd.recipient, RecipientSelector::Merchant(_)) {
            return Err(WalletError::InvalidRequest(
                "merchant payments need a merchant id".to_string(),
            )
            .into());
        }
        self.transfer(cmd).await
    }

    /// Pays a scanned QR code. The base reference is derived from the code's
    /// nonce, so paying the same code twice replays the first payment.
    pub async fn pay_qr(
        &self,
        payer: UserId,
        pin: String,
        payload: &str,
        amount: Option<Money>,
        now: DateTime<Utc>,
    ) -> StoreResult<TransferReceipt> {
        let qr = QrPayment::scan(payload, now).map_err(WalletError::from)?;
        let amount = qr.resolve_amount(amount).map_err(WalletError::from)?;
        let cmd = TransferCommand {
            sender: payer,
            pin,
            recipient: qr.recipient.selector(),
            amount,
            reference: None,
            description: qr.description.clone(),
        };
        self.execute(cmd, qr.base_reference(), now).await
    }

    async fn execute(
        &self,
        cmd: TransferCommand,
        base: String,
        now: DateTime<Utc>,
    ) -> StoreResult<TransferReceipt> {
        validate_reference(&base)?;

        let sender = find_wallet_by_owner(&self.db, cmd.sender)
            .await?
            .ok_or_else(|| {
                WalletError::WalletNotFound(format!("no wallet for owner {}", cmd.sender))
            })?;
        self.limiter.verify(cmd.sender, &cmd.pin, &sender.pin_hash)?;

        let resolved = self.resolve(&cmd.recipient).await?;
        let sink = fee_sink(&self.db, self.fee_sink_owner).await?;

        let (cmd_ref, base_ref, sender_ref, resolved_ref, sink_ref) =
            (&cmd, base.as_str(), &sender, &resolved, &sink);
        let receipt = retry_contended(base_ref, move || {
            self.post(cmd_ref, base_ref, sender_ref, resolved_ref, sink_ref, now)
        })
        .await?;
        if receipt.replayed {
            return Ok(receipt);
        }

        tracing::info!(
            reference = %receipt.reference,
            sender = %sender.wallet_id(),
            amount = %receipt.amount,
            fee = %receipt.fee,
            "transfer completed"
        );

        if let Some(recipient) = &resolved.wallet {
            if let Err(err) = RecipientRepository::new(self.db.clone())
                .record_transfer(
                    cmd.sender,
                    recipient.wallet_id(),
                    recipient.owner(),
                    receipt.amount,
                    now,
                )
                .await
            {
                tracing::warn!(
                    reference = %receipt.reference,
                    error = %err,
                    "failed to update recipients cache"
                );
            }
        }

        Ok(receipt)
    }

    /// One attempt at the unit of work: lock, replay or plan, apply every
    /// leg, commit.
    async fn post(
        &self,
        cmd: &TransferCommand,
        base: &str,
        sender: &wallets::Model,
        resolved: &ResolvedRecipient,
        sink: &wallets::Model,
        now: DateTime<Utc>,
    ) -> StoreResult<TransferReceipt> {
        let mut ids = vec![sender.wallet_id(), sink.wallet_id()];
        if let Some(recipient) = &resolved.wallet {
            ids.push(recipient.wallet_id());
        }

        let txn = self.db.begin().await?;
        let locked = lock_wallets(&txn, &ids).await?;
        let locked_wallet = |id: WalletId| {
            locked
                .get(&id)
                .ok_or_else(|| WalletError::WalletNotFound(id.to_string()))
        };

        if let Some(debit) = find_transaction(&txn, &leg_reference(base, Leg::Debit)).await? {
            if debit.wallet_id != sender.id || debit.amount != -cmd.amount.minor() {
                return Err(WalletError::DuplicateReference(format!(
                    "reference {base} was already used for a different payment"
                ))
                .into());
            }
            let credit = find_transaction(&txn, &leg_reference(base, Leg::Credit))
                .await?
                .ok_or_else(|| {
                    WalletError::InvariantViolation(format!(
                        "{base} has a debit leg but no credit leg"
                    ))
                })?;
            if Some(credit.wallet_id) != resolved.wallet.as_ref().map(|w| w.id) {
                return Err(WalletError::DuplicateReference(format!(
                    "reference {base} was already used for a different recipient"
                ))
                .into());
            }
            tracing::info!(reference = %base, "replaying completed transfer");
            return Ok(TransferReceipt {
                reference: base.to_string(),
                amount: cmd.amount,
                fee: credit.fee(),
                net_amount: credit.net(),
                sender_balance: Money::from_minor(debit.balance_after.unwrap_or(sender.balance)),
                recipient_wallet_id: WalletId::from_uuid(credit.wallet_id),
                replayed: true,
            });
        }

        let sender_row = locked_wallet(sender.wallet_id())?;
        let (_, spent) = spend_totals(&txn, sender_row, now).await?;
        let caps = SpendCaps {
            daily: Money::from_minor(sender_row.daily_limit),
            monthly: Money::from_minor(sender_row.monthly_limit),
        };
        let sender_party = party(sender_row)?;
        let sink_party = party(locked_wallet(sink.wallet_id())?)?;
        let recipient_party = match &resolved.wallet {
            Some(recipient) => Some(party(locked_wallet(recipient.wallet_id())?)?),
            None => None,
        };

        let ctx = TransferContext {
            sender: &sender_party,
            recipient: recipient_party.as_ref(),
            selector: &cmd.recipient,
            fee_sink: &sink_party,
            caps,
            spent,
        };
        let request = TransferRequest {
            base_reference: base.to_string(),
            amount: cmd.amount,
            channel: resolved.channel,
            description: cmd.description.clone(),
        };
        let plan = self.planner.plan(&ctx, &request)?;
        let recipient = recipient_party.ok_or_else(|| {
            WalletError::InvariantViolation(format!("{base} was planned without a recipient"))
        })?;

        let mut sender_balance = sender_party.balances.balance;
        for leg in &plan.legs {
            let mut new = NewTransaction::new(leg.wallet_id, &leg.reference, leg.kind, leg.amount)
                .with_fee(leg.fee)
                .with_description(plan_description(cmd, leg.kind))
                .with_metadata(serde_json::json!({ "base_reference": base }));
            new.counterparty = leg.counterparty;
            let applied = apply_in_txn(&txn, &new, now).await?;
            if leg.wallet_id == sender_party.wallet_id {
                sender_balance = Money::from_minor(
                    applied.transaction.balance_after.unwrap_or(sender_balance.minor()),
                );
            }
        }
        txn.commit().await?;

        Ok(TransferReceipt {
            reference: base.to_string(),
            amount: plan.amount,
            fee: plan.fee,
            net_amount: plan.net,
            sender_balance,
            recipient_wallet_id: recipient.wallet_id,
            replayed: false,
        })
    }

    /// Read-only recipient lookup. An unknown recipient resolves to `None`
    /// so the planner reports it in its fixed check order.
    async fn resolve(&self, selector: &RecipientSelector) -> StoreResult<ResolvedRecipient> {
        match selector {
            RecipientSelector::UserId(owner) => Ok(ResolvedRecipient {
                wallet: find_wallet_by_owner(&self.db, *owner).await?,
                channel: TransferChannel::Peer,
            }),
            RecipientSelector::Handle(handle) => {
                let wallet = wallets::Entity::find()
                    .filter(
                        wallets::Column::ContactHandle
                            .eq(handle.trim().trim_start_matches('@').to_lowercase()),
                    )
                    .one(&self.db)
                    .await?;
                Ok(ResolvedRecipient {
                    wallet,
                    channel: TransferChannel::Peer,
                })
            }
            RecipientSelector::Merchant(merchant_id) => {
                let merchant = merchants::Entity::find_by_id(merchant_id.into_inner())
                    .filter(merchants::Column::IsActive.eq(true))
                    .one(&self.db)
                    .await?;
                let Some(merchant) = merchant else {
                    return Ok(ResolvedRecipient {
                        wallet: None,
                        channel: TransferChannel::Merchant { fee_rate: None },
                    });
                };
                let wallet = wallets::Entity::find_by_id(merchant.wallet_id)
                    .one(&self.db)
                    .await?;
                let fee_rate = merchant
                    .fee_bps
                    .and_then(|bps| u32::try_from(bps).ok())
                    .map(bps_to_rate);
                Ok(ResolvedRecipient {
                    wallet,
                    channel: TransferChannel::Merchant { fee_rate },
                })
            }
        }
    }
}

fn party(wallet: &wallets::Model) -> Result<PartyState, WalletError> {
    Ok(PartyState {
        wallet_id: wallet.wallet_id(),
        owner_id: wallet.owner(),
        balances: wallet.snapshot()?,
        is_active: wallet.is_active,
        is_verified: wallet.is_verified,
        is_system: wallet.is_system,
    })
}

fn plan_description(cmd: &TransferCommand, kind: TransactionKind) -> Option<String> {
    match (kind, &cmd.description) {
        (TransactionKind::Fee, _) => Some(format!("fee from {}", cmd.sender)),
        (_, description) => description.clone(),
    }
}
