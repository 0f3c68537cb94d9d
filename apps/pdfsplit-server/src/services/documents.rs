//! Stored document inspection: ingest, metadata and page text

use pdfsplit_core::{resolve, DocumentMetadata, PageSelection, PageText, PdfDocument};
use tracing::{info, warn};

use super::run_blocking;
use crate::error::ApiError;
use crate::storage::{Storage, StoredDocument};

#[derive(Clone)]
pub struct DocumentService {
    storage: Storage,
}

impl DocumentService {
    pub fn new(storage: Storage) -> Self {
        DocumentService { storage }
    }

    /// Store an upload and read its metadata.
    ///
    /// A file that passes the signature sniff but cannot be parsed is removed
    /// again, so only readable documents get an id.
    pub async fn ingest(
        &self,
        bytes: &[u8],
        filename: &str,
    ) -> Result<(StoredDocument, DocumentMetadata), ApiError> {
        let doc = self.storage.store(bytes, filename).await?;
        match read_metadata(&doc).await {
            Ok(metadata) => {
                info!(
                    "Uploaded {} as {} ({} pages, {} bytes)",
                    doc.filename, doc.id, metadata.total_pages, doc.size_bytes
                );
                Ok((doc, metadata))
            }
            Err(e) => {
                warn!("Discarding unreadable upload {}: {}", doc.filename, e);
                self.storage.remove(&doc.id).await;
                Err(e)
            }
        }
    }

    pub async fn describe(&self, id: &str) -> Result<(StoredDocument, DocumentMetadata), ApiError> {
        let doc = self.storage.lookup(id).await?;
        let metadata = read_metadata(&doc).await?;
        Ok((doc, metadata))
    }

    /// Text of the pages `spec` selects, or of every page without a spec
    pub async fn text(
        &self,
        id: &str,
        spec: Option<&str>,
    ) -> Result<(StoredDocument, Vec<PageText>), ApiError> {
        let doc = self.storage.lookup(id).await?;
        let path = doc.path.clone();
        let spec = spec.map(str::to_string);

        let pages = run_blocking(move || {
            let pdf = PdfDocument::open(&path)?;
            let selection = match spec {
                Some(spec) => resolve(&spec, pdf.page_count())?,
                None => PageSelection::all(pdf.page_count())?,
            };
            Ok(pdf.extract_text_pages(&selection)?)
        })
        .await?;

        Ok((doc, pages))
    }
}

async fn read_metadata(doc: &StoredDocument) -> Result<DocumentMetadata, ApiError> {
    let path = doc.path.clone();
    run_blocking(move || Ok(PdfDocument::open(&path)?.metadata())).await
}
