use crate::domain::PoolId;
use crate::external::ExternalError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failures of engine operations. Every variant leaves stored state unchanged.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid token address")]
    InvalidToken,
    #[error("invalid duration: {0}s")]
    InvalidDuration(u64),
    #[error("amount must be greater than zero")]
    ZeroAmount,
    #[error("invalid address")]
    InvalidAddress,
    #[error("platform fee too high: {0} bps")]
    FeeTooHigh(u16),
    #[error("amount overflow")]
    AmountOverflow,
    #[error("unauthorized")]
    Unauthorized,
    #[error("pool {0} not found")]
    PoolNotFound(PoolId),
    #[error("pool {0} is closed")]
    PoolClosed(PoolId),
    #[error("pool {0} has expired")]
    PoolExpired(PoolId),
    #[error("pool {0} has not expired yet")]
    PoolNotExpired(PoolId),
    #[error("pool {0} is already closed")]
    AlreadyClosed(PoolId),
    #[error("pool {0} has deposits")]
    PoolHasDeposits(PoolId),
    #[error("settlement failed: {0}")]
    SettlementFailed(String),
    #[error("custody transfer failed: {0}")]
    Custody(#[source] ExternalError),
    #[error("engine not configured")]
    NotConfigured,
    #[error(transparent)]
    Storage(#[from] sqlx::Error),
}

/// Coarse classification of [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authorization,
    StateConflict,
    NotFound,
    Collaborator,
    Internal,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidToken
            | EngineError::InvalidDuration(_)
            | EngineError::ZeroAmount
            | EngineError::InvalidAddress
            | EngineError::FeeTooHigh(_)
            | EngineError::AmountOverflow => ErrorKind::Validation,
            EngineError::Unauthorized => ErrorKind::Authorization,
            EngineError::PoolNotFound(_) => ErrorKind::NotFound,
            EngineError::PoolClosed(_)
            | EngineError::PoolExpired(_)
            | EngineError::PoolNotExpired(_)
            | EngineError::AlreadyClosed(_)
            | EngineError::PoolHasDeposits(_) => ErrorKind::StateConflict,
            EngineError::SettlementFailed(_) | EngineError::Custody(_) => ErrorKind::Collaborator,
            EngineError::NotConfigured | EngineError::Storage(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidToken => "InvalidToken",
            EngineError::InvalidDuration(_) => "InvalidDuration",
            EngineError::ZeroAmount => "ZeroAmount",
            EngineError::InvalidAddress => "InvalidAddress",
            EngineError::FeeTooHigh(_) => "FeeTooHigh",
            EngineError::AmountOverflow => "AmountOverflow",
            EngineError::Unauthorized => "Unauthorized",
            EngineError::PoolNotFound(_) => "PoolNotFound",
            EngineError::PoolClosed(_) => "PoolClosed",
            EngineError::PoolExpired(_) => "PoolExpired",
            EngineError::PoolNotExpired(_) => "PoolNotExpired",
            EngineError::AlreadyClosed(_) => "AlreadyClosed",
            EngineError::PoolHasDeposits(_) => "PoolHasDeposits",
            EngineError::SettlementFailed(_) => "SettlementFailed",
            EngineError::Custody(_) => "CustodyFailed",
            EngineError::NotConfigured => "NotConfigured",
            EngineError::Storage(_) => "Storage",
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, error_message) = match self {
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal", msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BadRequest", msg),
            AppError::Engine(err) => {
                let status = match err.kind() {
                    ErrorKind::Validation => StatusCode::BAD_REQUEST,
                    ErrorKind::Authorization => StatusCode::FORBIDDEN,
                    ErrorKind::NotFound => StatusCode::NOT_FOUND,
                    ErrorKind::StateConflict => StatusCode::CONFLICT,
                    ErrorKind::Collaborator => StatusCode::BAD_GATEWAY,
                    ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.code(), err.to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
            "code": code,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_kinds() {
        assert_eq!(EngineError::FeeTooHigh(1001).kind(), ErrorKind::Validation);
        assert_eq!(EngineError::Unauthorized.kind(), ErrorKind::Authorization);
        assert_eq!(
            EngineError::PoolHasDeposits(PoolId::new(1)).kind(),
            ErrorKind::StateConflict
        );
        assert_eq!(
            EngineError::SettlementFailed("down".into()).kind(),
            ErrorKind::Collaborator
        );
    }

    #[test]
    fn test_engine_error_status_codes() {
        let cases = [
            (EngineError::ZeroAmount, StatusCode::BAD_REQUEST),
            (EngineError::Unauthorized, StatusCode::FORBIDDEN),
            (EngineError::PoolNotFound(PoolId::new(9)), StatusCode::NOT_FOUND),
            (EngineError::AlreadyClosed(PoolId::new(1)), StatusCode::CONFLICT),
            (
                EngineError::SettlementFailed("timeout".into()),
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (err, status) in cases {
            let response = AppError::from(err).into_response();
            assert_eq!(response.status(), status);
        }
    }
}
