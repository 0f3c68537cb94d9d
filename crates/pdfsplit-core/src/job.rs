//! Processing job records
//!
//! A job is created `Pending` for one (document, page spec) pair and moved
//! exactly once to `Succeeded` or `Failed`. The transition methods consume the
//! job, so a finished job cannot be resumed.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::selection::PageSelection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Succeeded,
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Succeeded => write!(f, "succeeded"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Why a job failed, as a stable code plus a human-readable reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessingJob {
    pub job_id: String,
    /// Input document; `None` when the upload was rejected before storage
    pub document_id: Option<String>,
    pub filename: Option<String>,
    /// Page spec exactly as the client sent it
    pub pages: String,
    pub selection: Option<PageSelection>,
    pub status: JobStatus,
    pub error: Option<JobError>,
    pub output_id: Option<String>,
    pub output_pages: Option<u32>,
}

impl ProcessingJob {
    pub fn new(job_id: impl Into<String>, document_id: Option<String>, pages: impl Into<String>) -> Self {
        ProcessingJob {
            job_id: job_id.into(),
            document_id,
            filename: None,
            pages: pages.into(),
            selection: None,
            status: JobStatus::Pending,
            error: None,
            output_id: None,
            output_pages: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn succeed(mut self, selection: PageSelection, output_id: impl Into<String>) -> Self {
        debug_assert_eq!(self.status, JobStatus::Pending);
        self.output_pages = Some(selection.len() as u32);
        self.selection = Some(selection);
        self.output_id = Some(output_id.into());
        self.status = JobStatus::Succeeded;
        self
    }

    pub fn fail(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        debug_assert_eq!(self.status, JobStatus::Pending);
        self.error = Some(JobError {
            code: code.into(),
            message: message.into(),
        });
        self.status = JobStatus::Failed;
        self
    }

    pub fn is_succeeded(&self) -> bool {
        self.status == JobStatus::Succeeded
    }

    /// Label used in error summaries: filename, else document id, else job id
    pub fn label(&self) -> &str {
        self.filename
            .as_deref()
            .or(self.document_id.as_deref())
            .unwrap_or(&self.job_id)
    }
}

/// One outcome per batch input, in input order
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub jobs: Vec<ProcessingJob>,
    /// ZIP of every successful output, when there was at least one
    pub archive_id: Option<String>,
}

impl BatchResult {
    pub fn succeeded(&self) -> usize {
        self.jobs.iter().filter(|j| j.is_succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.jobs.len() - self.succeeded()
    }

    /// "<label>: <reason>" for every failed job
    pub fn error_summaries(&self) -> Vec<String> {
        self.jobs
            .iter()
            .filter_map(|job| {
                job.error
                    .as_ref()
                    .map(|err| format!("{}: {}", job.label(), err.message))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::resolve;

    #[test]
    fn test_new_job_is_pending() {
        let job = ProcessingJob::new("job-1", Some("doc-1".into()), "1-2");
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.error.is_none());
        assert!(job.output_id.is_none());
    }

    #[test]
    fn test_succeed_records_output() {
        let job = ProcessingJob::new("job-1", Some("doc-1".into()), "3,1")
            .succeed(resolve("3,1", 3).unwrap(), "out-1");
        assert!(job.is_succeeded());
        assert_eq!(job.output_id.as_deref(), Some("out-1"));
        assert_eq!(job.output_pages, Some(2));
    }

    #[test]
    fn test_batch_counts_and_summaries() {
        let ok = ProcessingJob::new("a", Some("doc-a".into()), "1")
            .succeed(resolve("1", 1).unwrap(), "out-a");
        let bad = ProcessingJob::new("b", None, "1")
            .with_filename("notes.txt")
            .fail("NOT_PDF", "File is not a PDF");
        let result = BatchResult {
            jobs: vec![ok, bad],
            archive_id: None,
        };

        assert_eq!(result.succeeded(), 1);
        assert_eq!(result.failed(), 1);
        assert_eq!(result.error_summaries(), vec!["notes.txt: File is not a PDF"]);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Succeeded).unwrap(),
            "\"succeeded\""
        );
    }
}
