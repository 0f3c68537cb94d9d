//! Error types for the PDF splitter server

use axum::{
    extract::multipart::{MultipartError, MultipartRejection},
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pdfsplit_core::{CoreError, PdfError, SelectionError};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::storage::StorageError;

/// Server error types
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Pdf(#[from] PdfError),

    #[error("'{0}' is not a PDF file")]
    NotPdf(String),

    #[error("File is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("Request body too large: {0}")]
    BodyTooLarge(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Document expired: {0}")]
    Expired(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    code: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Selection(_) => StatusCode::BAD_REQUEST,
            ApiError::Pdf(PdfError::Unreadable(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Pdf(PdfError::InvalidPage { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Pdf(PdfError::WriteFailure(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NotPdf(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::TooLarge { .. } | ApiError::BodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) | ApiError::Expired(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Selection(e) => e.code(),
            ApiError::Pdf(e) => e.code(),
            ApiError::NotPdf(_) => "NOT_PDF",
            ApiError::TooLarge { .. } | ApiError::BodyTooLarge(_) => "TOO_LARGE",
            ApiError::InvalidRequest(_) => "INVALID_REQUEST",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Expired(_) => "EXPIRED",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{} ({})", self, self.code());
        }

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            code: self.code().to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Selection(e) => ApiError::Selection(e),
            CoreError::Pdf(e) => ApiError::Pdf(e),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(id) => ApiError::NotFound(id),
            StorageError::Expired(id) => ApiError::Expired(id),
            StorageError::NotPdf(name) => ApiError::NotPdf(name),
            StorageError::Empty => ApiError::InvalidRequest("Uploaded file is empty".into()),
            StorageError::TooLarge { size, limit } => ApiError::TooLarge { size, limit },
            StorageError::Io(e) => ApiError::Internal(format!("Storage I/O: {}", e)),
        }
    }
}

/// Extractor failure: 413 when a body limit was hit, 400 otherwise
fn rejected(status: StatusCode, text: String) -> ApiError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::BodyTooLarge(text)
    } else {
        ApiError::InvalidRequest(text)
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        rejected(err.status(), err.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(err: MultipartRejection) -> Self {
        rejected(err.status(), err.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        rejected(err.status(), err.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(err: QueryRejection) -> Self {
        rejected(err.status(), err.body_text())
    }
}
