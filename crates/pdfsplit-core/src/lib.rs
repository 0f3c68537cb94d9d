//! Page selection and PDF subset extraction
//!
//! This crate holds everything the split service needs that does not touch
//! HTTP or storage:
//! - `selection`: page spec parsing ("1-3, 5, 8-end") into a validated selection
//! - `document`: lopdf-backed access (page count, metadata, text, subsets)
//! - `job`: processing job and batch result records

pub mod document;
pub mod error;
pub mod job;
pub mod selection;
mod subset;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

pub use document::{format_page_texts, looks_like_pdf, DocumentMetadata, PageText, PdfDocument};
pub use error::{CoreError, PdfError, SelectionError};
pub use job::{BatchResult, JobError, JobStatus, ProcessingJob};
pub use selection::{resolve, PageSelection};

