//! API handlers for the PDF splitter server
//!
//! Provides REST endpoints for:
//! - Upload and inspection (metadata, page text)
//! - Single-file split
//! - Batch split, from uploads or stored documents
//! - Download of stored files

use axum::{
    body::Body,
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, QueryRejection},
        Multipart, Path, Query, State,
    },
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use pdfsplit_core::{format_page_texts, BatchResult, DocumentMetadata, PageText, ProcessingJob};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ApiError;
use crate::services::batch::DEFAULT_PAGES;
use crate::services::{BatchItem, UploadedFile};
use crate::AppState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Handler: GET /health
pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "pdfsplit-server",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Upload response
#[derive(Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub document_id: String,
    pub filename: String,
    pub metadata: DocumentMetadata,
    /// Human-readable size, e.g. "12.34 KB"
    pub file_size: String,
    pub file_size_bytes: u64,
}

/// Handler: POST /upload
///
/// Multipart body with a single `file` field.
pub async fn handle_upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut multipart = multipart?;
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or("document.pdf").to_string();
            let bytes = field.bytes().await?;
            upload = Some(UploadedFile {
                filename,
                bytes: bytes.to_vec(),
            });
        }
    }

    let upload = upload.ok_or_else(|| ApiError::InvalidRequest("No file provided".into()))?;
    let (doc, metadata) = state
        .documents
        .ingest(&upload.bytes, &upload.filename)
        .await?;

    Ok(Json(UploadResponse {
        success: true,
        document_id: doc.id,
        filename: doc.filename,
        metadata,
        file_size: format_file_size(doc.size_bytes),
        file_size_bytes: doc.size_bytes,
    }))
}

/// Document info response
#[derive(Serialize)]
pub struct DocumentInfoResponse {
    pub success: bool,
    pub document_id: String,
    pub filename: String,
    pub metadata: DocumentMetadata,
    pub file_size_bytes: u64,
}

/// Handler: GET /documents/:id
pub async fn handle_document_info(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DocumentInfoResponse>, ApiError> {
    let (doc, metadata) = state.documents.describe(&id).await?;

    Ok(Json(DocumentInfoResponse {
        success: true,
        document_id: doc.id,
        filename: doc.filename,
        metadata,
        file_size_bytes: doc.size_bytes,
    }))
}

#[derive(Deserialize)]
pub struct TextQuery {
    /// Page spec; every page when absent
    pub pages: Option<String>,
}

#[derive(Serialize)]
pub struct TextResponse {
    pub success: bool,
    pub document_id: String,
    pub pages: Vec<PageText>,
}

/// Handler: GET /documents/:id/text
pub async fn handle_document_text(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<TextQuery>, QueryRejection>,
) -> Result<Json<TextResponse>, ApiError> {
    let Query(query) = query?;
    let (doc, pages) = state.documents.text(&id, query.pages.as_deref()).await?;

    Ok(Json(TextResponse {
        success: true,
        document_id: doc.id,
        pages,
    }))
}

/// Split request body
#[derive(Deserialize)]
pub struct SplitRequest {
    pub document_id: String,

    /// Page spec, e.g. "1-3,5"
    #[serde(default = "default_pages")]
    pub pages: String,

    /// Only "pdf" is produced
    #[serde(default = "default_format")]
    pub output_format: String,
}

fn default_pages() -> String {
    DEFAULT_PAGES.to_string()
}

fn default_format() -> String {
    "pdf".to_string()
}

/// Split response
#[derive(Serialize)]
pub struct SplitResponse {
    pub success: bool,
    pub job: ProcessingJob,
    pub download_url: String,
    pub file_size: String,
    /// Metadata of the source document
    pub metadata: DocumentMetadata,
    /// Selected pages' text as `=== Page N ===` blocks
    pub extracted_text: String,
}

/// Handler: POST /split
pub async fn handle_split(
    State(state): State<AppState>,
    payload: Result<Json<SplitRequest>, JsonRejection>,
) -> Result<Json<SplitResponse>, ApiError> {
    let Json(req) = payload?;
    info!("Split request: document={}, pages={}", req.document_id, req.pages);

    if !req.output_format.eq_ignore_ascii_case("pdf") {
        return Err(ApiError::InvalidRequest(format!(
            "Invalid output format '{}'. Must be 'pdf'",
            req.output_format
        )));
    }

    let outcome = state.splitter.split(&req.document_id, &req.pages).await?;

    Ok(Json(SplitResponse {
        success: true,
        download_url: outcome.output.download_url(),
        file_size: format_file_size(outcome.output.size_bytes),
        metadata: outcome.metadata,
        extracted_text: format_page_texts(&outcome.pages),
        job: outcome.job,
    }))
}

/// Batch response, shared by both batch endpoints
#[derive(Serialize)]
pub struct BatchResponse {
    pub success: bool,
    pub total_files: usize,
    pub processed_files: usize,
    pub failed_files: usize,
    /// One job per input, in input order
    pub results: Vec<ProcessingJob>,
    /// ZIP of every successful output
    pub download_url: Option<String>,
    /// "<filename>: <reason>" per failed input
    pub errors: Vec<String>,
}

impl From<BatchResult> for BatchResponse {
    fn from(result: BatchResult) -> Self {
        let processed_files = result.succeeded();
        let failed_files = result.failed();
        let errors = result.error_summaries();
        BatchResponse {
            success: processed_files > 0,
            total_files: result.jobs.len(),
            processed_files,
            failed_files,
            download_url: result
                .archive_id
                .map(|id| format!("/download/{}.zip", id)),
            errors,
            results: result.jobs,
        }
    }
}

/// Handler: POST /batch-process
///
/// Multipart body with repeated `files` fields and `pages` given once (shared)
/// or once per file, in file order.
pub async fn handle_batch_process(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<BatchResponse>, ApiError> {
    let mut multipart = multipart?;
    let mut files = Vec::new();
    let mut specs = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "files" | "files[]" => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("file_{}.pdf", files.len() + 1));
                let bytes = field.bytes().await?;
                files.push(UploadedFile {
                    filename,
                    bytes: bytes.to_vec(),
                });
            }
            "pages" => specs.push(field.text().await?),
            other => debug!("Ignoring multipart field '{}'", other),
        }
    }

    info!("Batch process request: {} files", files.len());
    let result = state.batch.process_uploads(files, specs).await?;
    Ok(Json(result.into()))
}

#[derive(Deserialize)]
pub struct BatchSplitItem {
    pub document_id: String,
    pub pages: Option<String>,
}

/// Batch split request: explicit items, or ids sharing one page spec
#[derive(Deserialize)]
pub struct BatchSplitRequest {
    #[serde(default)]
    pub items: Vec<BatchSplitItem>,

    #[serde(default)]
    pub document_ids: Vec<String>,

    /// Shared page spec; items may override it
    pub pages: Option<String>,
}

impl BatchSplitRequest {
    fn into_items(self) -> Result<Vec<BatchItem>, ApiError> {
        if !self.items.is_empty() && !self.document_ids.is_empty() {
            return Err(ApiError::InvalidRequest(
                "Send either 'items' or 'document_ids', not both".into(),
            ));
        }

        let shared = self.pages.unwrap_or_else(default_pages);
        let items = if self.items.is_empty() {
            self.document_ids
                .into_iter()
                .map(|document_id| BatchItem::Document {
                    document_id,
                    filename: None,
                    pages: shared.clone(),
                })
                .collect()
        } else {
            self.items
                .into_iter()
                .map(|item| BatchItem::Document {
                    document_id: item.document_id,
                    filename: None,
                    pages: item.pages.unwrap_or_else(|| shared.clone()),
                })
                .collect()
        };
        Ok(items)
    }
}

/// Handler: POST /batch-split
pub async fn handle_batch_split(
    State(state): State<AppState>,
    payload: Result<Json<BatchSplitRequest>, JsonRejection>,
) -> Result<Json<BatchResponse>, ApiError> {
    let Json(req) = payload?;
    let items = req.into_items()?;
    info!("Batch split request: {} documents", items.len());

    let result = state.batch.batch_split(items).await?;
    Ok(Json(result.into()))
}

/// Handler: GET /download/:filename
pub async fn handle_download(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let (doc, bytes) = state.storage.retrieve(&filename).await?;
    debug!("Download {} ({} bytes)", doc.stored_name(), bytes.len());

    let disposition = format!("attachment; filename=\"{}\"", ascii_filename(&doc.filename));
    Ok((
        [
            (header::CONTENT_TYPE, doc.kind.mime_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from(bytes),
    )
        .into_response())
}

/// Size in kilobytes with two decimals
pub fn format_file_size(bytes: u64) -> String {
    format!("{:.2} KB", bytes as f64 / 1024.0)
}

/// Header-safe filename: printable ASCII, no quotes or backslashes
fn ascii_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect()
}
