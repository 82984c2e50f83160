//! Error handling module
//!
//! Centralized error types and HTTP response conversion. Every domain and
//! signature failure maps to a stable (`error_code`, status) pair.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::{DomainError, MoneyError};
use crate::signing::SignatureError;
use crate::store::StoreError;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    // Ledger rule violations
    #[error(transparent)]
    Domain(#[from] DomainError),

    // Request integrity
    #[error(transparent)]
    Signature(SignatureError),

    // Server errors (5xx)
    #[error("Storage error: {0}")]
    Store(StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<MoneyError> for AppError {
    fn from(err: MoneyError) -> Self {
        AppError::Domain(err.into())
    }
}

impl From<StoreError> for AppError {
    /// Store conflicts surface as the domain errors they represent
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict { wallet_id } => {
                AppError::Domain(DomainError::ConcurrentModification { wallet_id })
            }
            StoreError::DuplicateReference(reference) => {
                AppError::Domain(DomainError::DuplicateReference(reference))
            }
            StoreError::WalletNotFound(id) => AppError::Domain(DomainError::WalletNotFound(id)),
            StoreError::TransactionNotFound(id) => {
                AppError::Domain(DomainError::TransactionNotFound(id.to_string()))
            }
            StoreError::AccountNotFound(id) => AppError::Domain(DomainError::AccountNotFound(id)),
            StoreError::AccountFrozen(id) => AppError::Domain(DomainError::AccountFrozen(id)),
            other => AppError::Store(other),
        }
    }
}

impl From<SignatureError> for AppError {
    fn from(err: SignatureError) -> Self {
        match err {
            SignatureError::Store(store_err) => AppError::Store(store_err),
            other => AppError::Signature(other),
        }
    }
}

// Extractor rejections carry parser text; callers get a fixed message

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(error = %rejection.body_text(), "Rejected JSON body");
        let message = match rejection {
            JsonRejection::JsonSyntaxError(_) => "request body is not valid JSON",
            JsonRejection::JsonDataError(_) => "request body does not match the expected fields",
            JsonRejection::MissingJsonContentType(_) => "expected Content-Type: application/json",
            _ => "failed to read request body",
        };
        AppError::InvalidRequest(message.to_string())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        tracing::debug!(error = %rejection.body_text(), "Rejected path parameters");
        AppError::InvalidRequest("invalid path parameter".to_string())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        tracing::debug!(error = %rejection.body_text(), "Rejected query string");
        AppError::InvalidRequest("invalid query string".to_string())
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl AppError {
    /// HTTP status and stable error code
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),

            AppError::Domain(domain_err) => match domain_err {
                DomainError::WalletNotFound(_)
                | DomainError::TransactionNotFound(_)
                | DomainError::AccountNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                DomainError::InvalidAmount(_) => (StatusCode::BAD_REQUEST, "invalid_amount"),
                DomainError::CurrencyMismatch { .. } => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "currency_mismatch")
                }
                DomainError::InsufficientFunds { .. } => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "insufficient_funds")
                }
                DomainError::AccountFrozen(_) => (StatusCode::FORBIDDEN, "account_frozen"),
                DomainError::DuplicateReference(_) => (StatusCode::CONFLICT, "duplicate_reference"),
                DomainError::ConcurrentModification { .. } => {
                    (StatusCode::CONFLICT, "concurrent_modification")
                }
                DomainError::InvalidTransactionState { .. } => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "invalid_transaction_state")
                }
                DomainError::AlreadyReversed(_) => (StatusCode::CONFLICT, "already_reversed"),
            },

            AppError::Signature(sig_err) => match sig_err {
                SignatureError::MissingSignatureHeaders => {
                    (StatusCode::BAD_REQUEST, "missing_signature_headers")
                }
                SignatureError::UnsupportedSignatureVersion(_) => {
                    (StatusCode::BAD_REQUEST, "unsupported_signature_version")
                }
                SignatureError::RequestExpired => (StatusCode::UNAUTHORIZED, "request_expired"),
                SignatureError::ReplayDetected => (StatusCode::CONFLICT, "replay_detected"),
                SignatureError::InvalidSignature => (StatusCode::UNAUTHORIZED, "invalid_signature"),
                SignatureError::Store(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
                }
            },

            AppError::Store(store_err) => match store_err {
                StoreError::Unavailable(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
                }
                StoreError::StatusConflict { .. } => {
                    (StatusCode::CONFLICT, "concurrent_modification")
                }
                StoreError::AccountExists(_) => (StatusCode::CONFLICT, "account_exists"),
                StoreError::WalletExists { .. } => (StatusCode::CONFLICT, "wallet_exists"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            },

            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();

        let (error, details) = if status.is_server_error() {
            // Never leak storage engine text to callers
            tracing::error!(error = ?self, error_code, "Request failed");
            let message = if status == StatusCode::SERVICE_UNAVAILABLE {
                "Service temporarily unavailable"
            } else {
                "Internal server error"
            };
            (message.to_string(), None)
        } else {
            let details = match &self {
                AppError::Domain(DomainError::InsufficientFunds {
                    required,
                    available,
                }) => Some(format!("required {}, available {}", required, available)),
                AppError::Domain(DomainError::CurrencyMismatch { left, right }) => {
                    Some(format!("{} vs {}", left, right))
                }
                _ => None,
            };
            (self.to_string(), details)
        };

        let body = ErrorResponse {
            error,
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
