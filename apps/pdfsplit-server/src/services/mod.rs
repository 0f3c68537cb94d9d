//! Request-independent services
//!
//! Handlers translate HTTP input into these calls; nothing in here sees axum
//! extractors or responses.

pub mod archive;
pub mod batch;
pub mod documents;
pub mod split;

pub use batch::{BatchItem, BatchService};
pub use documents::DocumentService;
pub use split::{SplitOutcome, SplitService};

use crate::error::ApiError;

/// A file received in a multipart request
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Run lopdf work on the blocking pool
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("Task join error: {}", e)))?
}
