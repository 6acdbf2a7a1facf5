use crate::db::TestAdminError;
use crate::orchestration::{SalaryError, SyncError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Tracker error: {0}")]
    BadGateway(String),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<SalaryError> for AppError {
    fn from(err: SalaryError) -> Self {
        let msg = err.to_string();
        match err {
            SalaryError::GatewayUnavailable(_) | SalaryError::UnresolvableOffer { .. } => {
                AppError::BadGateway(msg)
            }
            SalaryError::TestNotSplit { .. } | SalaryError::DependencyCycle { .. } => {
                AppError::Conflict(msg)
            }
            SalaryError::UserNotFound(_) => AppError::NotFound(msg),
            SalaryError::InvalidPeriod(_) => AppError::BadRequest(msg),
            SalaryError::Db(_) => AppError::Internal(msg),
        }
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::DataSource(e) => AppError::BadGateway(e.to_string()),
            SyncError::Db(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<TestAdminError> for AppError {
    fn from(err: TestAdminError) -> Self {
        match err {
            TestAdminError::Validation(e) => AppError::BadRequest(e.to_string()),
            TestAdminError::Db(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
