//! Stable error codes carried in every error response.
//!
//! ```rust
//! use axum_helpers::errors::ErrorCode;
//!
//! let code = ErrorCode::PayloadTooLarge;
//! assert_eq!(code.as_str(), "PAYLOAD_TOO_LARGE");
//! assert_eq!(code.code(), 1013);
//! ```

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error identifiers shared by all HTTP handlers.
///
/// Integer ranges:
/// - 1000-1999: client errors
/// - 2000-2999: vector store errors
/// - 3000-3999: model and subprocess errors
/// - 4000-4999: I/O errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    NotFound,
    InternalError,
    /// Another request holds the resource (e.g. the training queue is full)
    Conflict,
    ServiceUnavailable,
    PayloadTooLarge,

    StoreQueryFailed,
    StoreTransactionFailed,

    /// Model artifact or item dump has not been produced yet
    ModelUnavailable,
    EmbeddingFailed,
    SubprocessFailed,
    SubprocessTimeout,

    IoError,

}

impl ErrorCode {
    /// SCREAMING_SNAKE_CASE identifier for clients.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::InternalError => "INTERNAL_ERROR",
            Self::Conflict => "CONFLICT",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::StoreQueryFailed => "STORE_QUERY_FAILED",
            Self::StoreTransactionFailed => "STORE_TRANSACTION_FAILED",
            Self::ModelUnavailable => "MODEL_UNAVAILABLE",
            Self::EmbeddingFailed => "EMBEDDING_FAILED",
            Self::SubprocessFailed => "SUBPROCESS_FAILED",
            Self::SubprocessTimeout => "SUBPROCESS_TIMEOUT",
            Self::IoError => "IO_ERROR",
        }
    }

    /// Integer code used in structured logs and metrics.
    pub fn code(&self) -> i32 {
        match self {
            Self::ValidationError => 1001,
            Self::NotFound => 1004,
            Self::InternalError => 1005,
            Self::Conflict => 1008,
            Self::ServiceUnavailable => 1011,
            Self::PayloadTooLarge => 1013,

            Self::StoreQueryFailed => 2001,
            Self::StoreTransactionFailed => 2002,

            Self::ModelUnavailable => 3001,
            Self::EmbeddingFailed => 3002,
            Self::SubprocessFailed => 3003,
            Self::SubprocessTimeout => 3004,

            Self::IoError => 4001,
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            Self::ValidationError => "Request validation failed",
            Self::NotFound => "Resource not found",
            Self::InternalError => "An internal server error occurred",
            Self::Conflict => "Resource is busy",
            Self::ServiceUnavailable => "Service is temporarily unavailable",
            Self::PayloadTooLarge => "Request body is too large",
            Self::StoreQueryFailed => "Vector store query failed",
            Self::StoreTransactionFailed => "Vector store transaction failed",
            Self::ModelUnavailable => "No trained model is available",
            Self::EmbeddingFailed => "Failed to compute embedding",
            Self::SubprocessFailed => "External tool failed",
            Self::SubprocessTimeout => "External tool timed out",
            Self::IoError => "I/O error occurred",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
