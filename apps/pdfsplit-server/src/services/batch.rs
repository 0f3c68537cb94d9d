//! Batch processing
//!
//! Items run independently through the split service with bounded
//! concurrency. A failing (or panicking) item becomes a failed job; it never
//! fails the batch. Results come back in input order.

use futures::stream::{self, StreamExt};
use pdfsplit_core::{BatchResult, ProcessingJob};
use tracing::{info, warn};
use uuid::Uuid;

use super::archive::build_archive;
use super::split::SplitService;
use super::UploadedFile;
use crate::error::ApiError;
use crate::storage::{Storage, StoredDocument};

/// Page spec applied when a batch request sends none
pub const DEFAULT_PAGES: &str = "1";

/// One unit of batch work
#[derive(Debug, Clone)]
pub enum BatchItem {
    /// Split a stored document
    Document {
        document_id: String,
        filename: Option<String>,
        pages: String,
    },
    /// An upload the gateway refused; reported as failed without running
    Rejected {
        filename: String,
        pages: String,
        code: String,
        message: String,
    },
}

#[derive(Clone)]
pub struct BatchService {
    splitter: SplitService,
    storage: Storage,
    concurrency: usize,
    max_batch_files: usize,
}

impl BatchService {
    pub fn new(
        splitter: SplitService,
        storage: Storage,
        concurrency: usize,
        max_batch_files: usize,
    ) -> Self {
        debug_assert!(concurrency > 0, "batch concurrency must be positive");
        BatchService {
            splitter,
            storage,
            concurrency,
            max_batch_files,
        }
    }

    /// Split every item, then archive the successful outputs
    pub async fn batch_split(&self, items: Vec<BatchItem>) -> Result<BatchResult, ApiError> {
        self.check_count(items.len())?;
        let total = items.len();

        let outcomes: Vec<(ProcessingJob, Option<StoredDocument>)> = stream::iter(items)
            .map(|item| run_item(self.splitter.clone(), self.storage.clone(), item))
            .buffered(self.concurrency)
            .collect()
            .await;

        let (jobs, outputs): (Vec<_>, Vec<_>) = outcomes.into_iter().unzip();
        let outputs: Vec<StoredDocument> = outputs.into_iter().flatten().collect();

        let archive_id = if outputs.is_empty() {
            None
        } else {
            match build_archive(&self.storage, &outputs).await {
                Ok(archive) => Some(archive.id),
                Err(e) => {
                    warn!("Batch archive failed: {}", e);
                    None
                }
            }
        };

        let result = BatchResult { jobs, archive_id };
        info!(
            "Batch finished: {} of {} succeeded",
            result.succeeded(),
            total
        );
        Ok(result)
    }

    /// Store uploaded files and split each with its page spec.
    ///
    /// `specs` may be empty (every file gets [`DEFAULT_PAGES`]), hold one
    /// spec shared by all files, or hold one spec per file.
    pub async fn process_uploads(
        &self,
        files: Vec<UploadedFile>,
        specs: Vec<String>,
    ) -> Result<BatchResult, ApiError> {
        self.check_count(files.len())?;
        let specs = expand_specs(specs, files.len())?;

        let mut items = Vec::with_capacity(files.len());
        for (file, pages) in files.into_iter().zip(specs) {
            let item = match self.storage.store(&file.bytes, &file.filename).await {
                Ok(doc) => BatchItem::Document {
                    document_id: doc.id,
                    filename: Some(doc.filename),
                    pages,
                },
                Err(e) => {
                    let err = ApiError::from(e);
                    warn!("Batch upload {} rejected: {}", file.filename, err);
                    BatchItem::Rejected {
                        filename: file.filename,
                        pages,
                        code: err.code().to_string(),
                        message: err.to_string(),
                    }
                }
            };
            items.push(item);
        }

        self.batch_split(items).await
    }

    fn check_count(&self, count: usize) -> Result<(), ApiError> {
        if count == 0 {
            return Err(ApiError::InvalidRequest("No files provided".into()));
        }
        if count > self.max_batch_files {
            return Err(ApiError::InvalidRequest(format!(
                "Too many files: {} (maximum {})",
                count, self.max_batch_files
            )));
        }
        Ok(())
    }
}

async fn run_item(
    splitter: SplitService,
    storage: Storage,
    item: BatchItem,
) -> (ProcessingJob, Option<StoredDocument>) {
    let job_id = Uuid::new_v4().to_string();

    let job = match item {
        BatchItem::Rejected {
            filename,
            pages,
            code,
            message,
        } => {
            let job = ProcessingJob::new(job_id, None, pages)
                .with_filename(filename)
                .fail(code, message);
            return (job, None);
        }
        BatchItem::Document {
            document_id,
            filename,
            pages,
        } => {
            // Name failures after the upload when the document is known
            let filename = match filename {
                Some(name) => Some(name),
                None => storage.lookup(&document_id).await.ok().map(|doc| doc.filename),
            };
            let job = ProcessingJob::new(job_id, Some(document_id), pages);
            match filename {
                Some(name) => job.with_filename(name),
                None => job,
            }
        }
    };

    let pending = job.clone();
    let handle = tokio::spawn(async move { splitter.execute(job).await });
    match handle.await {
        Ok(Ok(outcome)) => (outcome.job, Some(outcome.output)),
        Ok(Err(e)) => {
            warn!("Batch item {} failed: {}", pending.label(), e);
            (pending.fail(e.code(), e.to_string()), None)
        }
        Err(e) => {
            warn!("Batch item {} aborted: {}", pending.label(), e);
            (
                pending.fail("INTERNAL_ERROR", format!("Processing aborted: {}", e)),
                None,
            )
        }
    }
}

fn expand_specs(specs: Vec<String>, files: usize) -> Result<Vec<String>, ApiError> {
    match specs.len() {
        0 => Ok(vec![DEFAULT_PAGES.to_string(); files]),
        1 => Ok(vec![specs[0].clone(); files]),
        n if n == files => Ok(specs),
        n => Err(ApiError::InvalidRequest(format!(
            "Got {} page specs for {} files; send one shared spec or one per file",
            n, files
        ))),
    }
}
