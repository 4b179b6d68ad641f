//! Store-level error type.

use campuspay_core::WalletError;
use sea_orm::{DbErr, SqlErr};

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by repositories and services in this crate.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Domain failure; the unit of work was rolled back.
    #[error(transparent)]
    Wallet(WalletError),

    /// Database error.
    #[error("Database error: {0}")]
    Database(DbErr),
}

impl From<WalletError> for StoreError {
    fn from(err: WalletError) -> Self {
        if err.is_alert() {
            tracing::error!(alert = true, error = %err, "ledger invariant violated");
        }
        Self::Wallet(err)
    }
}

impl From<DbErr> for StoreError {
    fn from(err: DbErr) -> Self {
        // A unique-key race on a reference means another request won.
        if let Some(SqlErr::UniqueConstraintViolation(detail)) = err.sql_err() {
            tracing::debug!(%detail, "unique constraint race");
            return Self::Wallet(WalletError::ConcurrentModification);
        }
        if is_lock_contention(&err) {
            tracing::debug!(error = %err, "lock contention");
            return Self::Wallet(WalletError::ConcurrentModification);
        }
        Self::Database(err)
    }
}

/// SQLite reports a held write lock as an error; Postgres aborts the loser of
/// a serialization conflict or deadlock.
fn is_lock_contention(err: &DbErr) -> bool {
    const MARKERS: [&str; 4] = [
        "database is locked",
        "database table is locked",
        "could not serialize access",
        "deadlock detected",
    ];
    let message = err.to_string();
    MARKERS.iter().any(|marker| message.contains(marker))
}

impl StoreError {
    /// Returns the domain error, if any.
    #[must_use]
    pub fn as_wallet_error(&self) -> Option<&WalletError> {
        match self {
            Self::Wallet(err) => Some(err),
            Self::Database(_) => None,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Wallet(err) => err.error_code(),
            Self::Database(_) => "DATABASE_ERROR",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::Wallet(err) => err.http_status_code(),
            Self::Database(_) => 500,
        }
    }

    /// Returns true if repeating the request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Wallet(err) if err.is_retryable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_error_passes_through() {
        let err = StoreError::from(WalletError::InvalidCredential);
        assert_eq!(err.error_code(), "INVALID_PIN");
        assert_eq!(err.http_status_code(), 401);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_database_error_is_internal() {
        let err = StoreError::from(DbErr::Custom("boom".to_string()));
        assert_eq!(err.error_code(), "DATABASE_ERROR");
        assert_eq!(err.http_status_code(), 500);
        assert!(err.as_wallet_error().is_none());
    }

    #[test]
    fn test_concurrent_modification_is_retryable() {
        let err = StoreError::from(WalletError::ConcurrentModification);
        assert!(err.is_retryable());
        assert_eq!(err.http_status_code(), 409);
    }

    #[test]
    fn test_lock_contention_is_concurrent_modification() {
        let err = StoreError::from(DbErr::Custom("database is locked".to_string()));
        assert!(matches!(
            err.as_wallet_error(),
            Some(WalletError::ConcurrentModification)
        ));
    }
}
