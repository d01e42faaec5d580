use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use tandem_commission::{CommissionError, WalletError};
use tandem_core::{CoreError, RepoError};
use tandem_order::{validation_issues, OrderError, ReferralError};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    AuthenticationError(String),
    #[error("{0}")]
    AuthorizationError(String),
    #[error("{message}")]
    ValidationError { message: String, issues: Vec<String> },
    #[error("{0}")]
    NotFoundError(String),
    #[error("{0}")]
    ConflictError(String),
    #[error("{0}")]
    PaymentRequired(String),
    #[error("{0}")]
    ServiceUnavailable(String),
    #[error("{0}")]
    InternalServerError(String),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::ValidationError { message: message.into(), issues: Vec::new() }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, issues) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg, None),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, msg, None),
            AppError::ValidationError { message, issues } => (StatusCode::BAD_REQUEST, message, Some(issues)),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg, None),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg, None),
            AppError::PaymentRequired(msg) => (StatusCode::PAYMENT_REQUIRED, msg, None),
            AppError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg, None),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string(), None)
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {:#}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string(), None)
            }
        };

        let body = match issues {
            Some(issues) => json!({ "error": error_message, "issues": issues }),
            None => json!({ "error": error_message }),
        };

        (status, Json(body)).into_response()
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(what) => AppError::NotFoundError(format!("{} not found", what)),
            RepoError::Conflict(msg) => AppError::ConflictError(msg),
            e @ RepoError::InsufficientFunds { .. } => AppError::PaymentRequired(e.to_string()),
            e @ RepoError::Backend(_) => AppError::InternalServerError(e.to_string()),
        }
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InternalError(msg) => AppError::InternalServerError(msg),
            other => AppError::validation(other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::ValidationError {
            message: "Invalid request".to_string(),
            issues: validation_issues(&err),
        }
    }
}

impl From<ReferralError> for AppError {
    fn from(err: ReferralError) -> Self {
        match err {
            ReferralError::Repository(e) => e.into(),
            rejected => AppError::validation(rejected.to_string()),
        }
    }
}

impl From<CommissionError> for AppError {
    fn from(err: CommissionError) -> Self {
        match err {
            CommissionError::Repository(e) => e.into(),
            other => AppError::InternalServerError(other.to_string()),
        }
    }
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::Validation(issues) => AppError::ValidationError {
                message: "Invalid order".to_string(),
                issues,
            },
            OrderError::Referral(e) => e.into(),
            e @ OrderError::DuplicateTransaction(_) => AppError::ConflictError(e.to_string()),
            e @ OrderError::NotFound(_) => AppError::NotFoundError(e.to_string()),
            e @ OrderError::InvalidTransition { .. } => AppError::ConflictError(e.to_string()),
            OrderError::Commission(e) => e.into(),
            OrderError::Repository(e) => e.into(),
        }
    }
}

impl From<WalletError> for AppError {
    fn from(err: WalletError) -> Self {
        match err {
            e @ (WalletError::InvalidAmount(_)
            | WalletError::BelowMinimumPayout { .. }
            | WalletError::PaymentNotSettled(_)) => AppError::validation(e.to_string()),
            e @ WalletError::InsufficientFunds { .. } => AppError::PaymentRequired(e.to_string()),
            e @ WalletError::TransactionOwnershipMismatch(_) => AppError::AuthorizationError(e.to_string()),
            e @ WalletError::Gateway(_) => AppError::ServiceUnavailable(e.to_string()),
            WalletError::Repository(e) => e.into(),
        }
    }
}
