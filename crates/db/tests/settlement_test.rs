//! Settlement adapter tests against the sandbox gateway.
//!
//! These tests verify that:
//! - A verified funding credits exactly once, net of the deposit fee
//! - Gateway failures and amount mismatches close funding without credit
//! - Payouts reserve amount + fee and debit only on gateway success
//! - Timeouts flag rows for reconciliation instead of guessing
//! - Releasing a payout's hold by sweep, reconciler or operator fails the payout

#![allow(clippy::uninlined_format_args)]

mod common;

use campuspay_core::WalletError;
use campuspay_core::holds::{HoldState, ReleaseReason};
use campuspay_core::settlement::SandboxOutcome;
use campuspay_core::wallet::{Leg, TransactionStatus, leg_reference};
use campuspay_db::repositories::{
    FundingCommand, HOLD_CANCELLED, PayoutCommand, PayoutSweep, SETTLEMENT_TIMED_OUT,
};
use campuspay_shared::types::{Money, UserId};
use chrono::{Duration, Utc};

use common::{Harness, PIN, bank_account, biller, setup};

fn funding(owner: UserId, amount: i64, reference: &str) -> FundingCommand {
    FundingCommand {
        owner,
        amount: Money::from_minor(amount),
        email: "ada@campus.test".to_string(),
        reference: Some(reference.to_string()),
    }
}

fn withdrawal(owner: UserId, amount: i64, reference: &str) -> PayoutCommand {
    PayoutCommand {
        owner,
        pin: PIN.to_string(),
        amount: Money::from_minor(amount),
        destination: bank_account(),
        reference: Some(reference.to_string()),
        description: None,
    }
}

async fn status_of(h: &Harness, owner: UserId, reference: &str) -> TransactionStatus {
    let wallet = h.wallets.get_wallet(owner).await.unwrap();
    h.wallets
        .get_transaction(wallet.wallet_id(), reference)
        .await
        .unwrap()
        .status
        .into()
}

// ============================================================================
// Funding
// ============================================================================

#[tokio::test]
async fn test_funding_credits_once_net_of_fee() {
    let h = setup().await;
    let (owner, _) = h.open_wallet().await;

    let init = h
        .settlement
        .initialize_funding(funding(owner, 10_000, "FND-OK-1"))
        .await
        .unwrap();
    assert_eq!(init.reference, "FND-OK-1");
    assert_eq!(init.fee, Money::from_minor(150));
    assert!(init.external_reference.starts_with("SBX-"));
    assert_eq!(status_of(&h, owner, "FND-OK-1").await, TransactionStatus::Pending);
    assert_eq!(h.balances(owner).await, (0, 0));

    let row = h.settlement.verify_funding(owner, "FND-OK-1").await.unwrap();
    assert_eq!(TransactionStatus::from(row.status), TransactionStatus::Completed);
    assert_eq!(row.balance_before, Some(0));
    assert_eq!(row.balance_after, Some(9_850));
    assert_eq!(row.provider_reference.as_deref(), Some(init.external_reference.as_str()));
    assert_eq!(h.balances(owner).await, (9_850, 9_850));
    assert_eq!(h.fee_sink_balance().await, 150);

    // verifying a completed funding does not reach the gateway or credit again
    let again = h.settlement.verify_funding(owner, "FND-OK-1").await.unwrap();
    assert_eq!(again.id, row.id);
    assert_eq!(h.gateway.calls("verify_charge").await, 1);
    assert_eq!(h.balances(owner).await, (9_850, 9_850));
    assert_eq!(h.fee_sink_balance().await, 150);
}

#[tokio::test]
async fn test_funding_amount_mismatch_fails() {
    let h = setup().await;
    let (owner, _) = h.open_wallet().await;
    h.settlement
        .initialize_funding(funding(owner, 10_000, "FND-MISMATCH-1"))
        .await
        .unwrap();
    h.gateway
        .script("FND-MISMATCH-1", SandboxOutcome::SucceedWithAmount(Money::from_minor(9_000)))
        .await;

    let row = h.settlement.verify_funding(owner, "FND-MISMATCH-1").await.unwrap();
    assert_eq!(TransactionStatus::from(row.status), TransactionStatus::Failed);
    assert!(row.failure_reason.unwrap().contains("amount mismatch"));
    assert_eq!(h.balances(owner).await, (0, 0));
    assert_eq!(h.fee_sink_balance().await, 0);
}

#[tokio::test]
async fn test_declined_funding_fails_with_gateway_reason() {
    let h = setup().await;
    let (owner, _) = h.open_wallet().await;
    h.settlement
        .initialize_funding(funding(owner, 5_000, "FND-DECLINE-1"))
        .await
        .unwrap();
    h.gateway
        .script("FND-DECLINE-1", SandboxOutcome::Fail("card declined".to_string()))
        .await;

    let row = h.settlement.verify_funding(owner, "FND-DECLINE-1").await.unwrap();
    assert_eq!(TransactionStatus::from(row.status), TransactionStatus::Failed);
    assert_eq!(row.failure_reason.as_deref(), Some("card declined"));

    // the closed reference cannot be reused
    let err = h
        .settlement
        .initialize_funding(funding(owner, 5_000, "FND-DECLINE-1"))
        .await
        .unwrap_err();
    assert!(matches!(err.as_wallet_error(), Some(WalletError::DuplicateReference(_))));
}

#[tokio::test]
async fn test_pending_funding_stays_open_until_paid() {
    let h = setup().await;
    let (owner, _) = h.open_wallet().await;
    h.settlement
        .initialize_funding(funding(owner, 4_000, "FND-WAIT-1"))
        .await
        .unwrap();

    h.gateway.script("FND-WAIT-1", SandboxOutcome::Pending).await;
    let row = h.settlement.verify_funding(owner, "FND-WAIT-1").await.unwrap();
    assert_eq!(TransactionStatus::from(row.status), TransactionStatus::Pending);

    h.gateway.script("FND-WAIT-1", SandboxOutcome::Succeed).await;
    let row = h.settlement.verify_funding(owner, "FND-WAIT-1").await.unwrap();
    assert_eq!(TransactionStatus::from(row.status), TransactionStatus::Completed);
    assert_eq!(h.balances(owner).await, (3_940, 3_940));
}

#[tokio::test]
async fn test_verify_funding_of_another_owner_is_not_found() {
    let h = setup().await;
    let (owner, _) = h.open_wallet().await;
    let (stranger, _) = h.open_wallet().await;
    h.settlement
        .initialize_funding(funding(owner, 4_000, "FND-OWNER-1"))
        .await
        .unwrap();

    let err = h
        .settlement
        .verify_funding(stranger, "FND-OWNER-1")
        .await
        .unwrap_err();
    assert!(matches!(err.as_wallet_error(), Some(WalletError::TransactionNotFound(_))));
}

#[tokio::test]
async fn test_verify_timeout_flags_and_reconcile_completes() {
    let h = setup().await;
    let (owner, wallet) = h.open_wallet().await;
    h.settlement
        .initialize_funding(funding(owner, 10_000, "FND-SLOW-1"))
        .await
        .unwrap();

    h.gateway.script("FND-SLOW-1", SandboxOutcome::Hang).await;
    let err = h.settlement.verify_funding(owner, "FND-SLOW-1").await.unwrap_err();
    assert!(matches!(err.as_wallet_error(), Some(WalletError::GatewayTimeout(_))));
    assert_eq!(err.http_status_code(), 504);

    let row = h
        .wallets
        .get_transaction(wallet.wallet_id(), "FND-SLOW-1")
        .await
        .unwrap();
    assert!(row.reconciliation_required);
    assert_eq!(TransactionStatus::from(row.status), TransactionStatus::Pending);
    assert_eq!(h.balances(owner).await, (0, 0));

    h.gateway.script("FND-SLOW-1", SandboxOutcome::Succeed).await;
    let report = h.settlement.reconcile(Utc::now()).await.unwrap();
    assert_eq!(report.reverified_funding, 1);

    let row = h
        .wallets
        .get_transaction(wallet.wallet_id(), "FND-SLOW-1")
        .await
        .unwrap();
    assert!(!row.reconciliation_required);
    assert_eq!(TransactionStatus::from(row.status), TransactionStatus::Completed);
    assert_eq!(h.balances(owner).await, (9_850, 9_850));
}

// ============================================================================
// Payouts
// ============================================================================

#[tokio::test]
async fn test_withdrawal_holds_amount_plus_fee() {
    let h = setup().await;
    let (owner, wallet) = h.funded_wallet(3_000).await;

    let err = h
        .settlement
        .withdraw(withdrawal(owner, 2_000, "WDR-SCENARIO-1"))
        .await
        .unwrap_err();
    match err.as_wallet_error() {
        Some(WalletError::InsufficientFunds { available, required }) => {
            assert_eq!(*available, Money::from_minor(3_000));
            assert_eq!(*required, Money::from_minor(3_500));
        }
        other => panic!("expected InsufficientFunds, got {:?}", other),
    }

    let receipt = h
        .settlement
        .withdraw(withdrawal(owner, 1_000, "WDR-SCENARIO-2"))
        .await
        .unwrap();
    assert_eq!(receipt.fee, Money::from_minor(1_500));
    assert_eq!(receipt.hold_amount, Money::from_minor(2_500));
    assert_eq!(receipt.status, TransactionStatus::Processing);
    assert_eq!(receipt.available_balance, Money::from_minor(500));
    assert_eq!(h.balances(owner).await, (3_000, 500));

    let holds = h
        .holds
        .list_holds(wallet.wallet_id(), true, Utc::now())
        .await
        .unwrap();
    assert_eq!(holds.len(), 1);
    assert_eq!(holds[0].hold.reference, "WDR-SCENARIO-2-H");
    assert_eq!(holds[0].hold.amount, 2_500);

    // retrying the same request does not place a second hold
    let again = h
        .settlement
        .withdraw(withdrawal(owner, 1_000, "WDR-SCENARIO-2"))
        .await
        .unwrap();
    assert!(again.replayed);
    assert_eq!(h.balances(owner).await, (3_000, 500));
}

#[tokio::test]
async fn test_successful_payout_debits_once() {
    let h = setup().await;
    let (owner, wallet) = h.funded_wallet(3_000).await;
    h.settlement
        .withdraw(withdrawal(owner, 1_000, "WDR-SETTLE-1"))
        .await
        .unwrap();

    let sweep = h.settlement.process_payouts(10).await.unwrap();
    assert_eq!(
        sweep,
        PayoutSweep {
            settled: 1,
            ..PayoutSweep::default()
        }
    );
    assert_eq!(h.balances(owner).await, (500, 500));
    assert_eq!(h.fee_sink_balance().await, 1_500);

    let row = h
        .wallets
        .get_transaction(wallet.wallet_id(), "WDR-SETTLE-1")
        .await
        .unwrap();
    assert_eq!(TransactionStatus::from(row.status), TransactionStatus::Completed);
    assert_eq!(row.net_amount, -2_500);
    assert!(row.provider_reference.unwrap().starts_with("SBX-PO-"));

    let holds = h
        .holds
        .list_holds(wallet.wallet_id(), false, Utc::now())
        .await
        .unwrap();
    assert_eq!(holds[0].state, HoldState::Released);
    assert_eq!(holds[0].hold.release_reason.as_deref(), Some("settled"));

    // nothing left to drive
    let sweep = h.settlement.process_payouts(10).await.unwrap();
    assert_eq!(sweep, PayoutSweep::default());
    assert_eq!(h.balances(owner).await, (500, 500));

    let report = h.wallets.verify_ledger(wallet.wallet_id()).await.unwrap();
    assert_eq!(report.replayed_balance, Money::from_minor(500));
    assert_eq!(report.held, Money::ZERO);
}

#[tokio::test]
async fn test_failed_payout_restores_available_balance() {
    let h = setup().await;
    let (owner, _) = h.funded_wallet(3_000).await;
    h.settlement
        .withdraw(withdrawal(owner, 1_000, "WDR-FAIL-1"))
        .await
        .unwrap();
    h.gateway
        .script("WDR-FAIL-1", SandboxOutcome::Fail("account closed".to_string()))
        .await;

    let sweep = h.settlement.process_payouts(10).await.unwrap();
    assert_eq!(sweep.failed, 1);
    assert_eq!(h.balances(owner).await, (3_000, 3_000));
    assert_eq!(h.fee_sink_balance().await, 0);
    assert_eq!(status_of(&h, owner, "WDR-FAIL-1").await, TransactionStatus::Failed);
}

#[tokio::test]
async fn test_payout_timeout_leaves_row_for_reconciliation() {
    let h = setup().await;
    let (owner, wallet) = h.funded_wallet(3_000).await;
    h.settlement
        .withdraw(withdrawal(owner, 1_000, "WDR-SLOW-1"))
        .await
        .unwrap();
    h.gateway.script("WDR-SLOW-1", SandboxOutcome::Hang).await;

    let sweep = h.settlement.process_payouts(10).await.unwrap();
    assert_eq!(sweep.timed_out, 1);

    let row = h
        .wallets
        .get_transaction(wallet.wallet_id(), "WDR-SLOW-1")
        .await
        .unwrap();
    assert!(row.reconciliation_required);
    assert_eq!(TransactionStatus::from(row.status), TransactionStatus::Processing);
    assert_eq!(h.balances(owner).await, (3_000, 500));

    // the provider answers on the next pass
    h.gateway.script("WDR-SLOW-1", SandboxOutcome::Succeed).await;
    let sweep = h.settlement.process_payouts(10).await.unwrap();
    assert_eq!(sweep.settled, 1);
    assert_eq!(h.balances(owner).await, (500, 500));
}

#[tokio::test]
async fn test_reconcile_fails_payout_with_expired_hold() {
    let h = setup().await;
    let (owner, _) = h.funded_wallet(3_000).await;
    h.settlement
        .withdraw(withdrawal(owner, 1_000, "WDR-EXPIRE-1"))
        .await
        .unwrap();
    h.gateway.script("WDR-EXPIRE-1", SandboxOutcome::Pending).await;

    let sweep = h.settlement.process_payouts(10).await.unwrap();
    assert_eq!(sweep.in_flight, 1);
    assert_eq!(h.balances(owner).await, (3_000, 500));

    let report = h
        .settlement
        .reconcile(Utc::now() + Duration::days(2))
        .await
        .unwrap();
    assert_eq!(report.expired_holds, 1);
    assert_eq!(report.timed_out_payouts, 1);
    assert_eq!(h.balances(owner).await, (3_000, 3_000));

    let wallet = h.wallets.get_wallet(owner).await.unwrap();
    let row = h
        .wallets
        .get_transaction(wallet.wallet_id(), "WDR-EXPIRE-1")
        .await
        .unwrap();
    assert_eq!(TransactionStatus::from(row.status), TransactionStatus::Failed);
    assert_eq!(row.failure_reason.as_deref(), Some(SETTLEMENT_TIMED_OUT));

    // a late success report cannot debit a closed payout
    let sweep = h.settlement.process_payouts(10).await.unwrap();
    assert_eq!(sweep, PayoutSweep::default());
    assert_eq!(h.balances(owner).await, (3_000, 3_000));
}

#[tokio::test]
async fn test_hold_expiry_sweep_fails_its_payout() {
    let h = setup().await;
    let (owner, wallet) = h.funded_wallet(3_000).await;
    h.settlement
        .withdraw(withdrawal(owner, 1_000, "WDR-SWEEP-1"))
        .await
        .unwrap();
    assert_eq!(h.balances(owner).await, (3_000, 500));

    let released = h
        .holds
        .expire_holds(Utc::now() + Duration::days(2), 10)
        .await
        .unwrap();
    assert_eq!(released.len(), 1);
    assert_eq!(
        released[0].release.hold().reference,
        leg_reference("WDR-SWEEP-1", Leg::Hold)
    );
    let failed = released[0].failed_payout.as_ref().unwrap();
    assert_eq!(failed.reference, "WDR-SWEEP-1");
    assert_eq!(h.balances(owner).await, (3_000, 3_000));

    let row = h
        .wallets
        .get_transaction(wallet.wallet_id(), "WDR-SWEEP-1")
        .await
        .unwrap();
    assert_eq!(TransactionStatus::from(row.status), TransactionStatus::Failed);
    assert_eq!(row.failure_reason.as_deref(), Some(SETTLEMENT_TIMED_OUT));

    // nothing is left for the payout worker or the reconciler
    let sweep = h.settlement.process_payouts(10).await.unwrap();
    assert_eq!(sweep, PayoutSweep::default());
    let report = h
        .settlement
        .reconcile(Utc::now() + Duration::days(3))
        .await
        .unwrap();
    assert_eq!(report.expired_holds, 0);
    assert_eq!(h.balances(owner).await, (3_000, 3_000));
}

#[tokio::test]
async fn test_cancelled_hold_fails_its_payout() {
    let h = setup().await;
    let (owner, _) = h.funded_wallet(3_000).await;
    h.settlement
        .withdraw(withdrawal(owner, 1_000, "WDR-CANCEL-1"))
        .await
        .unwrap();

    let released = h
        .holds
        .release_hold(&leg_reference("WDR-CANCEL-1", Leg::Hold), ReleaseReason::Cancelled)
        .await
        .unwrap();
    let failed = released.failed_payout.unwrap();
    assert_eq!(failed.failure_reason.as_deref(), Some(HOLD_CANCELLED));
    assert_eq!(status_of(&h, owner, "WDR-CANCEL-1").await, TransactionStatus::Failed);

    let sweep = h.settlement.process_payouts(10).await.unwrap();
    assert_eq!(sweep, PayoutSweep::default());
    assert_eq!(h.balances(owner).await, (3_000, 3_000));
}

#[tokio::test]
async fn test_bill_payment_uses_bill_fee() {
    let h = setup().await;
    let (owner, _) = h.funded_wallet(20_000).await;

    let receipt = h
        .settlement
        .pay_bill(PayoutCommand {
            destination: biller(),
            ..withdrawal(owner, 10_000, "BIL-HOSTEL-1")
        })
        .await
        .unwrap();
    // 1.5% of 10_000 is below the 200 minimum
    assert_eq!(receipt.fee, Money::from_minor(200));
    assert_eq!(receipt.hold_amount, Money::from_minor(10_200));

    h.settlement.process_payouts(10).await.unwrap();
    assert_eq!(h.balances(owner).await, (9_800, 9_800));
    assert_eq!(h.fee_sink_balance().await, 200);
}

#[tokio::test]
async fn test_payout_destination_must_match_operation() {
    let h = setup().await;
    let (owner, _) = h.funded_wallet(20_000).await;

    let err = h
        .settlement
        .withdraw(PayoutCommand {
            destination: biller(),
            ..withdrawal(owner, 1_000, "WDR-DEST-1")
        })
        .await
        .unwrap_err();
    assert!(matches!(err.as_wallet_error(), Some(WalletError::InvalidRequest(_))));

    let err = h
        .settlement
        .pay_bill(withdrawal(owner, 1_000, "BIL-DEST-1"))
        .await
        .unwrap_err();
    assert!(matches!(err.as_wallet_error(), Some(WalletError::InvalidRequest(_))));
    assert_eq!(h.balances(owner).await, (20_000, 20_000));
}

#[tokio::test]
async fn test_withdrawal_with_wrong_pin_places_no_hold() {
    let h = setup().await;
    let (owner, _) = h.funded_wallet(5_000).await;

    let err = h
        .settlement
        .withdraw(PayoutCommand {
            pin: "0000".to_string(),
            ..withdrawal(owner, 1_000, "WDR-PIN-1")
        })
        .await
        .unwrap_err();
    assert!(matches!(err.as_wallet_error(), Some(WalletError::InvalidCredential)));
    assert_eq!(h.balances(owner).await, (5_000, 5_000));
}
