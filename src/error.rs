use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Failures raised by the storage layer. The HTTP surface translates them
/// through [`ApiError`]; library callers match on them directly.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid object path `{key}`: {reason}")]
    InvalidPath { key: String, reason: &'static str },

    #[error("unsupported archive format: {0}")]
    UnsupportedFormat(String),

    #[error("object `{key}` not found in bucket `{bucket}`")]
    NotFound { bucket: String, key: String },

    #[error("object store unavailable: {0}")]
    StorageUnavailable(String),

    #[error("archive exceeds limit: {0}")]
    ArchiveTooLarge(String),

    #[error("corrupt archive: {0}")]
    CorruptArchive(String),

    #[error(
        "archive extraction failed after {} uploaded entries (rolled back: {rolled_back}): {source}",
        .uploaded.len()
    )]
    PartialExtractionFailure {
        uploaded: Vec<String>,
        /// Keys that held an object before this call; rollback leaves them.
        replaced: Vec<String>,
        rolled_back: bool,
        #[source]
        source: Box<StorageError>,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    pub(crate) fn invalid_path(key: &str, reason: &'static str) -> Self {
        Self::InvalidPath {
            key: key.to_string(),
            reason,
        }
    }
}

impl From<s3::error::S3Error> for StorageError {
    fn from(err: s3::error::S3Error) -> Self {
        Self::StorageUnavailable(err.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),
    #[error("storage backend unavailable")]
    Unavailable,
    #[error("internal error")]
    Internal,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Unavailable => StatusCode::BAD_GATEWAY,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidPath { .. }
            | StorageError::UnsupportedFormat(_)
            | StorageError::CorruptArchive(_)
            | StorageError::InvalidInput(_) => ApiError::BadRequest(err.to_string()),
            StorageError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            StorageError::ArchiveTooLarge(_) => ApiError::PayloadTooLarge(err.to_string()),
            StorageError::PartialExtractionFailure { ref source, .. } => {
                tracing::error!("archive extraction failed: {}", err);
                match source.as_ref() {
                    StorageError::InvalidPath { .. } | StorageError::CorruptArchive(_) => {
                        ApiError::BadRequest(err.to_string())
                    }
                    StorageError::ArchiveTooLarge(_) => ApiError::PayloadTooLarge(err.to_string()),
                    StorageError::StorageUnavailable(_) => ApiError::Unavailable,
                    _ => ApiError::Internal,
                }
            }
            StorageError::StorageUnavailable(ref msg) => {
                tracing::error!("object store call failed: {}", msg);
                ApiError::Unavailable
            }
            StorageError::Io(ref e) => {
                tracing::error!("storage i/o failed: {:?}", e);
                ApiError::Internal
            }
        }
    }
}
