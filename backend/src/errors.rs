use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use payroll_zk::ProviderError;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the payroll core. None of them leave partial state behind.
#[derive(Debug, Error)]
pub enum PayrollError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("wallet {0} is already registered")]
    DuplicateWallet(String),

    #[error("employee {0} not found")]
    UnknownEmployee(Uuid),

    #[error("no employees to pay")]
    NoEmployees,

    #[error("a payroll run is already in progress")]
    ConcurrentRunRejected,

    #[error("payroll amounts overflow")]
    AmountOverflow,

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl PayrollError {
    /// Provider failures may be transient; the caller can simply try again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PayrollError::Provider(_))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("internal error")]
    Internal,
}

impl From<PayrollError> for ApiError {
    fn from(e: PayrollError) -> Self {
        match e {
            PayrollError::Validation(_) | PayrollError::NoEmployees | PayrollError::AmountOverflow => {
                ApiError::BadRequest(e.to_string())
            }
            PayrollError::DuplicateWallet(_) | PayrollError::ConcurrentRunRejected => ApiError::Conflict(e.to_string()),
            PayrollError::UnknownEmployee(_) => ApiError::NotFound(e.to_string()),
            PayrollError::Provider(_) => ApiError::Unavailable(e.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match &self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
            ApiError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m.clone()),
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string()),
        };

        (status, Json(ErrorBody { error: msg })).into_response()
    }
}
