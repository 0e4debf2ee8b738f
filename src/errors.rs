use axum::{
    Json,
    extract::{
        multipart::MultipartError,
        rejection::{PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use thiserror::Error;

use crate::{
    models::file_kind::FileKind,
    services::{backend::BackendError, transform::TransformError},
};

/// Failures of the file lifecycle operations.
///
/// Each variant maps to a distinct HTTP status so callers can tell "bad
/// request" apart from "not found" and "backend down" and decide whether
/// to retry.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("file must be a type of {expected}, but got {actual}")]
    TypeMismatch { expected: FileKind, actual: String },
    #[error("{0} not found")]
    NotFound(String),
    #[error("storage backend unavailable: {0}")]
    BackendUnavailable(BackendError),
    #[error("could not allocate a free identifier under `{kind}` after {attempts} attempts")]
    AllocationExhausted { kind: FileKind, attempts: u32 },
    #[error("deleted {deleted} objects but failed to delete {}", .failed.join(", "))]
    PartialDeleteFailure { deleted: usize, failed: Vec<String> },
    #[error("transform failed: {0}")]
    TransformFailed(#[from] TransformError),
    #[error("metadata document is unreadable: {0}")]
    CorruptMetadata(#[from] serde_json::Error),
}

pub type FileResult<T> = Result<T, FileError>;

impl From<BackendError> for FileError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::InvalidKey(key) => {
                FileError::InvalidInput(format!("store key `{}` is not acceptable", key))
            }
            other => FileError::BackendUnavailable(other),
        }
    }
}

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<FileError> for AppError {
    fn from(err: FileError) -> Self {
        let status = match &err {
            FileError::InvalidInput(_) | FileError::TypeMismatch { .. } => StatusCode::BAD_REQUEST,
            FileError::TransformFailed(TransformError::InvalidCropBox(_)) => StatusCode::BAD_REQUEST,
            FileError::TransformFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            FileError::NotFound(_) => StatusCode::NOT_FOUND,
            FileError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            FileError::AllocationExhausted { .. }
            | FileError::PartialDeleteFailure { .. }
            | FileError::CorruptMetadata(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }
        AppError::new(status, err.to_string())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::new(err.status(), err.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(err: PathRejection) -> Self {
        AppError::new(err.status(), err.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(err: QueryRejection) -> Self {
        AppError::new(err.status(), err.body_text())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}
