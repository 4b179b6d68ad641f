//! `SeaORM` active enums, stored as strings so the schema stays portable.

use campuspay_core::holds::HoldReason as CoreHoldReason;
use campuspay_core::wallet::{
    TransactionKind as CoreTransactionKind, TransactionStatus as CoreTransactionStatus,
};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Transaction kind column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(24))")]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    #[sea_orm(string_value = "deposit")]
    Deposit,
    #[sea_orm(string_value = "withdrawal")]
    Withdrawal,
    #[sea_orm(string_value = "transfer_send")]
    TransferSend,
    #[sea_orm(string_value = "transfer_receive")]
    TransferReceive,
    #[sea_orm(string_value = "payment")]
    Payment,
    #[sea_orm(string_value = "fee")]
    Fee,
    #[sea_orm(string_value = "refund")]
    Refund,
}

/// Transaction status column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(24))")]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

/// Hold reason column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(24))")]
#[serde(rename_all = "snake_case")]
pub enum HoldReason {
    #[sea_orm(string_value = "withdrawal")]
    Withdrawal,
    #[sea_orm(string_value = "bill_payment")]
    BillPayment,
}

// Conversion helpers

impl From<CoreTransactionKind> for TransactionKind {
    fn from(kind: CoreTransactionKind) -> Self {
        match kind {
            CoreTransactionKind::Deposit => Self::Deposit,
            CoreTransactionKind::Withdrawal => Self::Withdrawal,
            CoreTransactionKind::TransferSend => Self::TransferSend,
            CoreTransactionKind::TransferReceive => Self::TransferReceive,
            CoreTransactionKind::Payment => Self::Payment,
            CoreTransactionKind::Fee => Self::Fee,
            CoreTransactionKind::Refund => Self::Refund,
        }
    }
}

impl From<TransactionKind> for CoreTransactionKind {
    fn from(kind: TransactionKind) -> Self {
        match kind {
            TransactionKind::Deposit => Self::Deposit,
            TransactionKind::Withdrawal => Self::Withdrawal,
            TransactionKind::TransferSend => Self::TransferSend,
            TransactionKind::TransferReceive => Self::TransferReceive,
            TransactionKind::Payment => Self::Payment,
            TransactionKind::Fee => Self::Fee,
            TransactionKind::Refund => Self::Refund,
        }
    }
}

impl From<CoreTransactionStatus> for TransactionStatus {
    fn from(status: CoreTransactionStatus) -> Self {
        match status {
            CoreTransactionStatus::Pending => Self::Pending,
            CoreTransactionStatus::Processing => Self::Processing,
            CoreTransactionStatus::Completed => Self::Completed,
            CoreTransactionStatus::Failed => Self::Failed,
            CoreTransactionStatus::Cancelled => Self::Cancelled,
        }
    }
}

impl From<TransactionStatus> for CoreTransactionStatus {
    fn from(status: TransactionStatus) -> Self {
        match status {
            TransactionStatus::Pending => Self::Pending,
            TransactionStatus::Processing => Self::Processing,
            TransactionStatus::Completed => Self::Completed,
            TransactionStatus::Failed => Self::Failed,
            TransactionStatus::Cancelled => Self::Cancelled,
        }
    }
}

impl From<CoreHoldReason> for HoldReason {
    fn from(reason: CoreHoldReason) -> Self {
        match reason {
            CoreHoldReason::Withdrawal => Self::Withdrawal,
            CoreHoldReason::BillPayment => Self::BillPayment,
        }
    }
}

impl From<HoldReason> for CoreHoldReason {
    fn from(reason: HoldReason) -> Self {
        match reason {
            HoldReason::Withdrawal => Self::Withdrawal,
            HoldReason::BillPayment => Self::BillPayment,
        }
    }
}
