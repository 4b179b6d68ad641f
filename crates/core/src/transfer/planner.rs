//! Transfer planner: validation order and leg construction.

use campuspay_shared::types::Money;

use super::types::{LegPlan, TransferChannel, TransferContext, TransferPlan, TransferRequest};
use crate::error::{WalletError, WalletResult};
use crate::fees::{FeeKind, FeePolicy};
use crate::limits::check_limits;
use crate::wallet::{Leg, TransactionKind, leg_reference, validate_reference};

/// Plans transfers against a fee schedule.
#[derive(Debug, Clone, Default)]
pub struct TransferPlanner {
    fees: FeePolicy,
}

impl TransferPlanner {
    /// Creates a planner.
    #[must_use]
    pub fn new(fees: FeePolicy) -> Self {
        Self { fees }
    }

    /// Fee schedule in use.
    #[must_use]
    pub fn fees(&self) -> &FeePolicy {
        &self.fees
    }

    /// Validates the request and builds the legs.
    ///
    /// Checks run in a fixed order and the first failure wins: sender
    /// active, available balance, limits, recipient, fee.
    pub fn plan(&self, ctx: &TransferContext<'_>, req: &TransferRequest) -> WalletResult<TransferPlan> {
        validate_reference(&req.base_reference)?;
        if !req.amount.is_positive() {
            return Err(WalletError::InvalidAmount(
                "transfer amount must be positive".to_string(),
            ));
        }

        let sender = ctx.sender;
        if !sender.is_active {
            return Err(WalletError::WalletInactive(sender.wallet_id.to_string()));
        }

        if sender.balances.available < req.amount {
            return Err(WalletError::InsufficientFunds {
                available: sender.balances.available,
                required: req.amount,
            });
        }

        check_limits(&ctx.caps, &ctx.spent, req.amount)?;

        let recipient = ctx
            .recipient
            .ok_or_else(|| WalletError::RecipientNotFound(ctx.selector.to_string()))?;
        if recipient.wallet_id == sender.wallet_id {
            return Err(WalletError::InvalidRecipient(
                "cannot transfer to your own wallet".to_string(),
            ));
        }
        if recipient.is_system {
            return Err(WalletError::InvalidRecipient(
                "the platform fee wallet cannot receive transfers".to_string(),
            ));
        }
        if !recipient.is_active {
            return Err(WalletError::InvalidRecipient(format!(
                "recipient wallet {} is inactive",
                recipient.wallet_id
            )));
        }

        let (fee_kind, override_rate) = match req.channel {
            TransferChannel::Peer => (FeeKind::Transfer, None),
            TransferChannel::Merchant { fee_rate } => {
                if !recipient.is_verified {
                    return Err(WalletError::InvalidRecipient(format!(
                        "merchant wallet {} is not verified",
                        recipient.wallet_id
                    )));
                }
                (FeeKind::MerchantPayment, fee_rate)
            }
        };
        let fee = self.fees.compute_fee(fee_kind, req.amount, override_rate)?;
        if fee >= req.amount {
            return Err(WalletError::InvalidAmount(format!(
                "amount {} must exceed the fee of {fee}",
                req.amount
            )));
        }

        Ok(build_legs(ctx, req, fee))
    }
}

fn build_legs(ctx: &TransferContext<'_>, req: &TransferRequest, fee: Money) -> TransferPlan {
    let (debit_kind, credit_kind) = req.channel.leg_kinds();
    let base = &req.base_reference;
    let sender = ctx.sender.wallet_id;
    // plan() has already resolved the recipient
    let recipient = ctx.recipient.map_or(sender, |r| r.wallet_id);

    let mut legs = vec![
        LegPlan {
            wallet_id: sender,
            reference: leg_reference(base, Leg::Debit),
            kind: debit_kind,
            amount: -req.amount,
            fee: Money::ZERO,
            counterparty: Some(recipient),
        },
        LegPlan {
            wallet_id: recipient,
            reference: leg_reference(base, Leg::Credit),
            kind: credit_kind,
            amount: req.amount,
            fee,
            counterparty: Some(sender),
        },
    ];
    if fee.is_positive() {
        legs.push(LegPlan {
            wallet_id: ctx.fee_sink.wallet_id,
            reference: leg_reference(base, Leg::Fee),
            kind: TransactionKind::Fee,
            amount: fee,
            fee: Money::ZERO,
            counterparty: Some(sender),
        });
    }

    TransferPlan {
        base_reference: base.clone(),
        amount: req.amount,
        fee,
        net: req.amount - fee,
        legs,
    }
}
