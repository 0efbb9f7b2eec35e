use axum::response::{IntoResponse, Response};
use axum_helpers::{AppError, ErrorCode};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PhraseError {
    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {output}")]
    SubprocessExit {
        program: String,
        status: String,
        output: String,
    },

    #[error("{program} timed out after {seconds}s")]
    Timeout { program: String, seconds: u64 },

    #[error("{0} cancelled")]
    Cancelled(String),

    #[error("Artifact missing: {0}")]
    ArtifactMissing(String),

    #[error("Vector store transaction failed: {0}")]
    Transaction(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store query failed: {0}")]
    StoreQuery(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Corpus exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: u64 },

    #[error("Training queue is full ({0} jobs pending)")]
    Busy(usize),

    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Item dump error: {0}")]
    ItemDump(String),

    #[error("Vector has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type PhraseResult<T> = Result<T, PhraseError>;

impl PhraseError {
    /// Stable code for logs and metric labels.
    pub fn code(&self) -> ErrorCode {
        match self {
            PhraseError::Spawn { .. } | PhraseError::SubprocessExit { .. } => {
                ErrorCode::SubprocessFailed
            }
            PhraseError::Timeout { .. } => ErrorCode::SubprocessTimeout,
            PhraseError::Cancelled(_) => ErrorCode::ServiceUnavailable,
            PhraseError::ArtifactMissing(_) => ErrorCode::ModelUnavailable,
            PhraseError::Transaction(_) => ErrorCode::StoreTransactionFailed,
            PhraseError::Embedding(_) | PhraseError::DimensionMismatch { .. } => {
                ErrorCode::EmbeddingFailed
            }
            PhraseError::StoreQuery(_) => ErrorCode::StoreQueryFailed,
            PhraseError::Validation(_) => ErrorCode::ValidationError,
            PhraseError::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
            PhraseError::Busy(_) => ErrorCode::Conflict,
            PhraseError::JobNotFound(_) => ErrorCode::NotFound,
            PhraseError::Io(_) => ErrorCode::IoError,
            PhraseError::ItemDump(_) | PhraseError::Internal(_) => ErrorCode::InternalError,
        }
    }
}

impl From<csv::Error> for PhraseError {
    fn from(err: csv::Error) -> Self {
        PhraseError::ItemDump(err.to_string())
    }
}

impl From<tokio::task::JoinError> for PhraseError {
    fn from(err: tokio::task::JoinError) -> Self {
        PhraseError::Internal(format!("Background task failed: {}", err))
    }
}

/// Convert PhraseError to AppError for standardized HTTP error responses
impl From<PhraseError> for AppError {
    fn from(err: PhraseError) -> Self {
        let code = err.code();
        let message = err.to_string();
        match err {
            PhraseError::Validation(msg) => AppError::BadRequest(msg),
            PhraseError::JobNotFound(id) => AppError::NotFound(format!("Job {} not found", id)),
            PhraseError::Busy(_) => AppError::Conflict(message),
            PhraseError::PayloadTooLarge { .. } => AppError::PayloadTooLarge(message),
            PhraseError::Io(e) => AppError::Io(e),
            PhraseError::Internal(msg) => AppError::InternalServerError(msg),
            PhraseError::Cancelled(_) => AppError::ServiceUnavailable(message),
            _ => AppError::coded(code, message),
        }
    }
}

impl IntoResponse for PhraseError {
    fn into_response(self) -> Response {
        let app_error: AppError = self.into();
        app_error.into_response()
    }
}
