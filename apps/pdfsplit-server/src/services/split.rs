//! Single-file split
//!
//! One job: open the stored input, resolve the page spec against it, write
//! the selected pages to a new stored output and pull the text of those pages.

use std::path::Path;

use pdfsplit_core::{resolve, DocumentMetadata, PageText, PdfDocument, ProcessingJob};
use tracing::{info, warn};
use uuid::Uuid;

use super::run_blocking;
use crate::error::ApiError;
use crate::storage::{DocumentKind, Storage, StoredDocument};

/// Everything a finished split produced
#[derive(Debug, Clone)]
pub struct SplitOutcome {
    pub job: ProcessingJob,
    pub output: StoredDocument,
    /// Metadata of the source document
    pub metadata: DocumentMetadata,
    /// Text of each selected page, in selection order
    pub pages: Vec<PageText>,
}

#[derive(Clone)]
pub struct SplitService {
    storage: Storage,
}

impl SplitService {
    pub fn new(storage: Storage) -> Self {
        SplitService { storage }
    }

    pub async fn split(&self, document_id: &str, spec: &str) -> Result<SplitOutcome, ApiError> {
        let job = ProcessingJob::new(Uuid::new_v4().to_string(), Some(document_id.to_string()), spec);
        self.execute(job).await
    }

    /// Run a pending job to completion.
    ///
    /// On error the job is left untouched; callers that keep failed jobs
    /// record the error themselves.
    pub async fn execute(&self, job: ProcessingJob) -> Result<SplitOutcome, ApiError> {
        let document_id = job
            .document_id
            .clone()
            .ok_or_else(|| ApiError::InvalidRequest("Job has no input document".into()))?;
        let source = self.storage.lookup(&document_id).await?;
        let job = match job.filename {
            Some(_) => job,
            None => job.with_filename(source.filename.clone()),
        };

        let (output_id, output_path) = self.storage.allocate(DocumentKind::Output);
        let source_path = source.path.clone();
        let target = output_path.clone();
        let spec = job.pages.clone();

        let (selection, pages, metadata) = run_blocking(move || {
            let doc = PdfDocument::open(&source_path)?;
            let selection = resolve(&spec, doc.page_count())?;
            let pages = doc.extract_text_pages(&selection)?;
            doc.write_subset(selection.pages(), &target)?;
            Ok((selection, pages, doc.metadata()))
        })
        .await?;

        let output = match self
            .storage
            .register(
                output_id,
                output_path.clone(),
                output_filename(&source.filename),
                DocumentKind::Output,
            )
            .await
        {
            Ok(output) => output,
            Err(e) => {
                warn!("Discarding unregistered output {}", output_path.display());
                let _ = tokio::fs::remove_file(&output_path).await;
                return Err(e.into());
            }
        };

        info!(
            "Split {} pages '{}' -> {} ({} pages, {} bytes)",
            document_id,
            job.pages,
            output.id,
            selection.len(),
            output.size_bytes
        );

        Ok(SplitOutcome {
            job: job.succeed(selection, output.id.clone()),
            output,
            metadata,
            pages,
        })
    }
}

/// Download name for a split of `source`: `extracted_<stem>.pdf`
pub fn output_filename(source: &str) -> String {
    let stem = Path::new(source)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("document");
    format!("extracted_{}.pdf", stem)
}
