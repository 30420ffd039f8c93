//! JSON error responses for the HTTP API.
//!
//! Every failure renders as `{ "code": <int>, "message": <string>, "data": null }`.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::purchase::GateError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    InvalidRequestBody(String),

    #[error("{0}")]
    NotExist(String),

    #[error("{0}")]
    AuthenticationFailed(String),

    #[error("Transaction hash already submitted")]
    TxHashDuplicated,

    #[error("Invalid transaction hash")]
    InvalidTxHash,

    #[error("File exceeds the maximum upload size of {max_mb} MB")]
    FileSizeLimitExceeded { max_mb: u64 },

    #[error("{0}")]
    Internal(String),

    #[error("{0}")]
    LedgerUnavailable(String),
}

impl ApiError {
    pub fn code(&self) -> u16 {
        match self {
            ApiError::InvalidRequestBody(_) => 1,
            ApiError::NotExist(_) => 3,
            ApiError::AuthenticationFailed(_) => 4,
            ApiError::TxHashDuplicated => 7,
            ApiError::InvalidTxHash => 8,
            ApiError::FileSizeLimitExceeded { .. } => 11,
            ApiError::Internal(_) => 500,
            ApiError::LedgerUnavailable(_) => 502,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequestBody(_) | ApiError::InvalidTxHash => StatusCode::BAD_REQUEST,
            ApiError::NotExist(_) => StatusCode::NOT_FOUND,
            ApiError::AuthenticationFailed(_) => StatusCode::FORBIDDEN,
            ApiError::TxHashDuplicated => StatusCode::CONFLICT,
            ApiError::FileSizeLimitExceeded { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::LedgerUnavailable(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Map a `spawn_blocking` join failure.
    pub fn join(e: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("Task join error: {}", e))
    }
}

impl From<String> for ApiError {
    fn from(e: String) -> Self {
        ApiError::Internal(e)
    }
}

/// Malformed or mistyped JSON bodies are the caller's fault, not a 422.
impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::InvalidRequestBody(e.body_text())
    }
}

impl From<GateError> for ApiError {
    fn from(e: GateError) -> Self {
        match e {
            GateError::InvalidRequestBody(msg) => ApiError::InvalidRequestBody(msg),
            GateError::AuthenticationFailed => ApiError::AuthenticationFailed(e.to_string()),
            GateError::NotExist => ApiError::NotExist(e.to_string()),
            GateError::Ledger(_) => ApiError::LedgerUnavailable(e.to_string()),
            GateError::Storage(_) | GateError::Envelope(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status().is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        let body = serde_json::json!({
            "code": self.code(),
            "message": self.to_string(),
            "data": null,
        });
        (self.status(), Json(body)).into_response()
    }
}
