//! In-memory payment gateway for development and tests.
//!
//! Outcomes are scripted per reference (or via a default), and every call
//! is counted so tests can assert how often the provider was hit.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use campuspay_shared::types::Money;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::gateway::{
    ChargeInit, ChargeRequest, ChargeVerification, GatewayError, GatewayStatus, PaymentGateway,
    PayoutRequest, PayoutResult,
};

/// Scripted provider behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxOutcome {
    /// Complete with the requested amount.
    Succeed,
    /// Complete, but report a different amount.
    SucceedWithAmount(Money),
    /// Decline with a message.
    Fail(String),
    /// Report the operation as unfinished.
    Pending,
    /// Never answer.
    Hang,
}

#[derive(Debug, Clone)]
struct SandboxCharge {
    amount: Money,
    external_reference: String,
}

#[derive(Debug, Default)]
struct SandboxState {
    default_outcome: Option<SandboxOutcome>,
    scripts: HashMap<String, SandboxOutcome>,
    charges: HashMap<String, SandboxCharge>,
    payouts: HashMap<String, String>,
    calls: HashMap<&'static str, usize>,
}

/// Deterministic in-process gateway.
#[derive(Debug, Default)]
pub struct SandboxGateway {
    latency: Duration,
    state: RwLock<SandboxState>,
}

impl SandboxGateway {
    /// Creates a gateway where every call succeeds immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a fixed delay to every call.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Sets the outcome for references without their own script.
    pub async fn set_default(&self, outcome: SandboxOutcome) {
        self.state.write().await.default_outcome = Some(outcome);
    }

    /// Scripts the outcome for one reference.
    pub async fn script(&self, reference: &str, outcome: SandboxOutcome) {
        self.state
            .write()
            .await
            .scripts
            .insert(reference.to_string(), outcome);
    }

    /// Number of calls made to `operation` (`initialize_charge`,
    /// `verify_charge` or `initiate_payout`).
    pub async fn calls(&self, operation: &str) -> usize {
        self.state
            .read()
            .await
            .calls
            .get(operation)
            .copied()
            .unwrap_or(0)
    }

    async fn enter(&self, operation: &'static str, reference: &str) -> SandboxOutcome {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let mut state = self.state.write().await;
        *state.calls.entry(operation).or_insert(0) += 1;
        state
            .scripts
            .get(reference)
            .or(state.default_outcome.as_ref())
            .cloned()
            .unwrap_or(SandboxOutcome::Succeed)
    }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn initialize_charge(&self, request: &ChargeRequest) -> Result<ChargeInit, GatewayError> {
        if self.enter("initialize_charge", &request.reference).await == SandboxOutcome::Hang {
            return std::future::pending().await;
        }
        let mut state = self.state.write().await;
        let charge = state
            .charges
            .entry(request.reference.clone())
            .or_insert_with(|| SandboxCharge {
                amount: request.amount,
                external_reference: format!("SBX-{}", Uuid::new_v4().simple()),
            });
        Ok(ChargeInit {
            authorization_handle: format!("sandbox://checkout/{}", request.reference),
            external_reference: charge.external_reference.clone(),
        })
    }

    async fn verify_charge(&self, reference: &str) -> Result<ChargeVerification, GatewayError> {
        let outcome = self.enter("verify_charge", reference).await;
        let charge = self
            .state
            .read()
            .await
            .charges
            .get(reference)
            .cloned()
            .ok_or_else(|| GatewayError::UnknownReference(reference.to_string()))?;

        let raw = serde_json::json!({
            "reference": reference,
            "provider_reference": charge.external_reference,
        });
        let (status, amount, message) = match outcome {
            SandboxOutcome::Succeed => (GatewayStatus::Success, charge.amount, None),
            SandboxOutcome::SucceedWithAmount(amount) => (GatewayStatus::Success, amount, None),
            SandboxOutcome::Fail(message) => (GatewayStatus::Failed, charge.amount, Some(message)),
            SandboxOutcome::Pending => (GatewayStatus::Pending, charge.amount, None),
            SandboxOutcome::Hang => return std::future::pending().await,
        };
        Ok(ChargeVerification {
            status,
            channel: Some("card".to_string()),
            amount,
            message,
            raw,
        })
    }

    async fn initiate_payout(&self, request: &PayoutRequest) -> Result<PayoutResult, GatewayError> {
        let outcome = self.enter("initiate_payout", &request.reference).await;
        let provider_reference = {
            let mut state = self.state.write().await;
            state
                .payouts
                .entry(request.reference.clone())
                .or_insert_with(|| format!("SBX-PO-{}", Uuid::new_v4().simple()))
                .clone()
        };
        let (status, message) = match outcome {
            SandboxOutcome::Succeed | SandboxOutcome::SucceedWithAmount(_) => {
                (GatewayStatus::Success, None)
            }
            SandboxOutcome::Fail(message) => (GatewayStatus::Failed, Some(message)),
            SandboxOutcome::Pending => (GatewayStatus::Pending, None),
            SandboxOutcome::Hang => return std::future::pending().await,
        };
        Ok(PayoutResult {
            status,
            provider_reference: Some(provider_reference),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settlement::gateway::{PayoutDestination, with_timeout};
    use campuspay_shared::types::Currency;

    fn charge(reference: &str, amount: i64) -> ChargeRequest {
        ChargeRequest {
            reference: reference.to_string(),
            amount: Money::from_minor(amount),
            currency: Currency::Ngn,
            email: "ada@campus.test".to_string(),
            metadata: serde_json::Value::Null,
        }
    }

    fn payout(reference: &str) -> PayoutRequest {
        PayoutRequest {
            reference: reference.to_string(),
            amount: Money::from_minor(2_000),
            currency: Currency::Ngn,
            destination: PayoutDestination::BankAccount {
                bank_code: "058".to_string(),
                account_number: "0123456789".to_string(),
                account_name: "Ada Obi".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_charge_round_trip() {
        let gateway = SandboxGateway::new();
        let init = gateway.initialize_charge(&charge("FND-1", 10_000)).await.unwrap();
        assert!(init.authorization_handle.contains("FND-1"));

        let again = gateway.initialize_charge(&charge("FND-1", 10_000)).await.unwrap();
        assert_eq!(init.external_reference, again.external_reference);

        let v = gateway.verify_charge("FND-1").await.unwrap();
        assert_eq!(v.status, GatewayStatus::Success);
        assert_eq!(v.amount, Money::from_minor(10_000));
        assert_eq!(gateway.calls("verify_charge").await, 1);
    }

    #[tokio::test]
    async fn test_scripted_outcomes() {
        let gateway = SandboxGateway::new();
        gateway.script("FND-2", SandboxOutcome::Fail("Declined".into())).await;
        gateway.initialize_charge(&charge("FND-2", 500)).await.unwrap();
        let v = gateway.verify_charge("FND-2").await.unwrap();
        assert_eq!(v.status, GatewayStatus::Failed);
        assert_eq!(v.message.as_deref(), Some("Declined"));

        gateway.set_default(SandboxOutcome::Pending).await;
        let p = gateway.initiate_payout(&payout("WDR-1")).await.unwrap();
        assert_eq!(p.status, GatewayStatus::Pending);
    }

    #[tokio::test]
    async fn test_unknown_charge() {
        let gateway = SandboxGateway::new();
        let err = gateway.verify_charge("nope").await.unwrap_err();
        assert_eq!(err, GatewayError::UnknownReference("nope".into()));
    }

    #[tokio::test]
    async fn test_hang_times_out() {
        let gateway = SandboxGateway::new();
        gateway.script("WDR-2", SandboxOutcome::Hang).await;
        let result = with_timeout(Duration::from_millis(20), "WDR-2", gateway.initiate_payout(&payout("WDR-2"))).await;
        assert_eq!(result, Err(GatewayError::Timeout("WDR-2".into())));
    }

    #[tokio::test]
    async fn test_payout_reference_is_stable() {
        let gateway = SandboxGateway::new();
        let a = gateway.initiate_payout(&payout("WDR-3")).await.unwrap();
        let b = gateway.initiate_payout(&payout("WDR-3")).await.unwrap();
        assert_eq!(a.provider_reference, b.provider_reference);
        assert_eq!(gateway.calls("initiate_payout").await, 2);
    }
}
