//! JSON error responses.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use campuspay_core::WalletError;
use campuspay_db::StoreError;
use serde_json::json;

/// Error returned by handlers; renders as `{"error": CODE, "message": ...}`.
#[derive(Debug)]
pub enum ApiError {
    /// Failure from the ledger store.
    Store(StoreError),
    /// Malformed request the handler rejected before reaching the store.
    BadRequest(String),
    /// The caller may not perform the operation.
    Forbidden(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<WalletError> for ApiError {
    fn from(err: WalletError) -> Self {
        Self::Store(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = match self {
            Self::BadRequest(message) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": "INVALID_REQUEST", "message": message })),
                )
                    .into_response();
            }
            Self::Forbidden(message) => {
                return (
                    StatusCode::FORBIDDEN,
                    Json(json!({ "error": "FORBIDDEN", "message": message })),
                )
                    .into_response();
            }
            Self::Store(err) => err,
        };

        let status = StatusCode::from_u16(err.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let upstream = matches!(
            err.as_wallet_error(),
            Some(WalletError::Gateway(_) | WalletError::GatewayTimeout(_))
        );
        // Gateway messages are actionable; database and invariant details stay in the logs.
        let message = if status.is_server_error() && !upstream {
            tracing::error!(error = %err, "request failed");
            "An internal error occurred".to_string()
        } else {
            err.to_string()
        };

        let mut response = (
            status,
            Json(json!({ "error": err.error_code(), "message": message })),
        )
            .into_response();

        if let Some(WalletError::PinLocked { retry_after_secs }) = err.as_wallet_error() {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campuspay_shared::types::Money;
    use rstest::rstest;

    #[rstest]
    #[case(WalletError::InvalidCredential, StatusCode::UNAUTHORIZED)]
    #[case(WalletError::WalletNotFound("w".into()), StatusCode::NOT_FOUND)]
    #[case(WalletError::DuplicateReference("r".into()), StatusCode::CONFLICT)]
    #[case(
        WalletError::InsufficientFunds { available: Money::ZERO, required: Money::from_minor(1) },
        StatusCode::UNPROCESSABLE_ENTITY
    )]
    #[case(WalletError::GatewayTimeout("r".into()), StatusCode::GATEWAY_TIMEOUT)]
    #[case(WalletError::InvariantViolation("x".into()), StatusCode::INTERNAL_SERVER_ERROR)]
    fn test_status_mapping(#[case] err: WalletError, #[case] status: StatusCode) {
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), status);
    }

    #[test]
    fn test_pin_locked_sets_retry_after() {
        let response =
            ApiError::from(WalletError::PinLocked { retry_after_secs: 42 }).into_response();
        assert_eq!(response.status(), StatusCode::LOCKED);
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "42");
    }
}
