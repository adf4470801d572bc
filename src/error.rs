use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::ports::RepositoryError;
use crate::services::{LedgerError, SettlementError, SyncError};
use crate::validation::ValidationError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Settlement(#[from] SettlementError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Settlement(e) => match e {
                SettlementError::Validation(_)
                | SettlementError::BelowMinimum { .. }
                | SettlementError::InsufficientFunds { .. } => StatusCode::BAD_REQUEST,
                SettlementError::BorrowingBlocked => StatusCode::FORBIDDEN,
                SettlementError::WalletNotFound | SettlementError::FarmerNotFound => StatusCode::NOT_FOUND,
                SettlementError::GatewayRejected(_) => StatusCode::BAD_GATEWAY,
                SettlementError::TryLater(_) => StatusCode::SERVICE_UNAVAILABLE,
                SettlementError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn reason_code(&self) -> &'static str {
        match self {
            AppError::Settlement(e) => e.reason_code(),
            AppError::Validation(_) => "validation",
            AppError::NotFound(_) => "not_found",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Unavailable(_) => "try_later",
            AppError::Internal(_) => "internal",
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(what) => AppError::NotFound(what),
            RepositoryError::Transient(e) => AppError::Unavailable(e),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::WalletNotFound(_) => AppError::NotFound(err.to_string()),
            LedgerError::Repository(e) => e.into(),
            other => AppError::Settlement(other.into()),
        }
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::FarmerNotFound(_) => AppError::NotFound(err.to_string()),
            SyncError::Repository(e) => e.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.reason_code(), error = %self, "request failed");
        }
        let body = Json(json!({
            "status": "fail",
            "code": self.reason_code(),
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}
