//! External settlement: the payment gateway capability, the decisions taken
//! on its answers, and an in-memory sandbox implementation.

pub mod gateway;
pub mod sandbox;
pub mod state;

pub use gateway::{
    ChargeInit, ChargeRequest, ChargeVerification, GatewayError, GatewayStatus, PaymentGateway,
    PayoutDestination, PayoutRequest, PayoutResult, with_timeout,
};
pub use sandbox::{SandboxGateway, SandboxOutcome};
pub use state::{FundingDecision, PayoutDecision, PayoutPlan, decide_funding, decide_payout};
