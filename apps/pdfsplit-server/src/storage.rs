//! Upload/download storage
//!
//! Files live in one scoped directory under generated UUID names
//! (`<id>.pdf`, `<id>.zip`). The registry maps ids to entries; client input
//! is only ever used as a registry key, never joined onto a path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use pdfsplit_core::looks_like_pdf;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Document expired: {0}")]
    Expired(String),

    #[error("'{0}' is not a PDF file")]
    NotPdf(String),

    #[error("Uploaded file is empty")]
    Empty,

    #[error("File is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// A PDF a client uploaded
    Upload,
    /// A PDF produced by a split
    Output,
    /// A ZIP of batch outputs
    Archive,
}

impl DocumentKind {
    pub fn extension(self) -> &'static str {
        match self {
            DocumentKind::Upload | DocumentKind::Output => "pdf",
            DocumentKind::Archive => "zip",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            DocumentKind::Upload | DocumentKind::Output => "application/pdf",
            DocumentKind::Archive => "application/zip",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredDocument {
    pub id: String,
    /// Original (uploads) or suggested (outputs) download name
    pub filename: String,
    pub kind: DocumentKind,
    pub size_bytes: u64,
    pub stored_at: DateTime<Utc>,
    #[serde(skip)]
    pub path: PathBuf,
    #[serde(skip)]
    created: Instant,
}

impl StoredDocument {
    /// Name the file is stored and served under
    pub fn stored_name(&self) -> String {
        format!("{}.{}", self.id, self.kind.extension())
    }

    pub fn download_url(&self) -> String {
        format!("/download/{}", self.stored_name())
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.created.elapsed() >= ttl
    }
}

/// Scoped file store with TTL-based retention
#[derive(Clone)]
pub struct Storage {
    root: PathBuf,
    ttl: Duration,
    max_upload_bytes: usize,
    entries: Arc<RwLock<HashMap<String, StoredDocument>>>,
}

impl Storage {
    /// Create (or reuse) the storage directory.
    ///
    /// Files left behind by an earlier run are unreachable once the registry
    /// starts empty, so generated names found there are removed.
    pub async fn open(
        root: impl Into<PathBuf>,
        ttl: Duration,
        max_upload_bytes: usize,
    ) -> Result<Self, StorageError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;

        let stale = remove_stale_files(&root).await?;
        if stale > 0 {
            info!("Removed {} stale files from {}", stale, root.display());
        }

        Ok(Storage {
            root,
            ttl,
            max_upload_bytes,
            entries: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store an upload after checking its size and PDF signature
    pub async fn store(&self, bytes: &[u8], filename: &str) -> Result<StoredDocument, StorageError> {
        let filename = sanitize_filename(filename);

        if bytes.is_empty() {
            return Err(StorageError::Empty);
        }
        if bytes.len() > self.max_upload_bytes {
            return Err(StorageError::TooLarge {
                size: bytes.len(),
                limit: self.max_upload_bytes,
            });
        }
        if !looks_like_pdf(bytes) {
            return Err(StorageError::NotPdf(filename));
        }

        let (id, path) = self.allocate(DocumentKind::Upload);
        tokio::fs::write(&path, bytes).await?;

        debug!("Stored upload {} as {}", filename, id);
        self.insert(id, path, filename, DocumentKind::Upload, bytes.len() as u64)
            .await
    }

    /// Reserve an id and path for a generated file. Nothing is registered
    /// until [`Storage::register`] is called with the finished file.
    pub fn allocate(&self, kind: DocumentKind) -> (String, PathBuf) {
        let id = Uuid::new_v4().to_string();
        let path = self.root.join(format!("{}.{}", id, kind.extension()));
        (id, path)
    }

    pub async fn register(
        &self,
        id: String,
        path: PathBuf,
        filename: String,
        kind: DocumentKind,
    ) -> Result<StoredDocument, StorageError> {
        let size = tokio::fs::metadata(&path).await?.len();
        self.insert(id, path, filename, kind, size).await
    }

    async fn insert(
        &self,
        id: String,
        path: PathBuf,
        filename: String,
        kind: DocumentKind,
        size_bytes: u64,
    ) -> Result<StoredDocument, StorageError> {
        let doc = StoredDocument {
            id: id.clone(),
            filename,
            kind,
            size_bytes,
            stored_at: Utc::now(),
            path,
            created: Instant::now(),
        };
        self.entries.write().await.insert(id, doc.clone());
        Ok(doc)
    }

    /// Find a live entry by id, with or without its file extension
    pub async fn lookup(&self, name: &str) -> Result<StoredDocument, StorageError> {
        let id = normalize_id(name).ok_or_else(|| StorageError::NotFound(name.to_string()))?;

        let entries = self.entries.read().await;
        let doc = entries
            .get(id)
            .ok_or_else(|| StorageError::NotFound(name.to_string()))?;
        if doc.is_expired(self.ttl) {
            return Err(StorageError::Expired(name.to_string()));
        }
        Ok(doc.clone())
    }

    pub async fn retrieve(&self, name: &str) -> Result<(StoredDocument, Vec<u8>), StorageError> {
        let doc = self.lookup(name).await?;
        match tokio::fs::read(&doc.path).await {
            Ok(bytes) => Ok((doc, bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Registered file {} is missing on disk", doc.path.display());
                self.entries.write().await.remove(&doc.id);
                Err(StorageError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Drop an entry and its file; unknown ids are ignored
    pub async fn remove(&self, id: &str) {
        let removed = self.entries.write().await.remove(id);
        if let Some(doc) = removed {
            delete_file(&doc.path).await;
        }
    }

    /// Delete every expired entry, returning how many were removed
    pub async fn sweep_expired(&self) -> usize {
        let expired: Vec<StoredDocument> = {
            let mut entries = self.entries.write().await;
            let ids: Vec<String> = entries
                .values()
                .filter(|doc| doc.is_expired(self.ttl))
                .map(|doc| doc.id.clone())
                .collect();
            ids.iter().filter_map(|id| entries.remove(id)).collect()
        };

        for doc in &expired {
            delete_file(&doc.path).await;
        }
        expired.len()
    }

    /// Delete everything, used at shutdown
    pub async fn purge_all(&self) -> usize {
        let all: Vec<StoredDocument> = self.entries.write().await.drain().map(|(_, d)| d).collect();
        for doc in &all {
            delete_file(&doc.path).await;
        }
        all.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Run [`Storage::sweep_expired`] every `every` until the task is aborted
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let storage = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let removed = storage.sweep_expired().await;
                if removed > 0 {
                    info!("Swept {} expired files, {} remain", removed, storage.len().await);
                }
            }
        })
    }
}

/// Strip a `.pdf`/`.zip` suffix and accept only generated (UUID) ids
fn normalize_id(name: &str) -> Option<&str> {
    let id = name
        .strip_suffix(".pdf")
        .or_else(|| name.strip_suffix(".zip"))
        .unwrap_or(name);
    Uuid::parse_str(id).ok().map(|_| id)
}

/// Keep only the final path component of a client-supplied filename
fn sanitize_filename(filename: &str) -> String {
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if name.is_empty() || name == "." || name == ".." {
        "document.pdf".to_string()
    } else {
        name.to_string()
    }
}

async fn delete_file(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to delete {}: {}", path.display(), e);
        }
    }
}

async fn remove_stale_files(root: &Path) -> Result<usize, StorageError> {
    let mut removed = 0;
    let mut dir = tokio::fs::read_dir(root).await?;
    while let Some(entry) = dir.next_entry().await? {
        let path = entry.path();
        let generated = path
            .file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|stem| Uuid::parse_str(stem).is_ok());
        let known_extension = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| matches!(ext, "pdf" | "zip" | "partial"));
        if generated && known_extension {
            delete_file(&path).await;
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdfsplit_core::fixtures::sample_pdf;

    const MB: usize = 1024 * 1024;

    async fn storage_with_ttl(dir: &Path, ttl: Duration) -> Storage {
        Storage::open(dir, ttl, MB).await.unwrap()
    }

    #[tokio::test]
    async fn test_store_and_retrieve() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage_with_ttl(dir.path(), Duration::from_secs(60)).await;
        let pdf = sample_pdf(2);

        let doc = storage.store(&pdf, "report.pdf").await.unwrap();
        assert_eq!(doc.filename, "report.pdf");
        assert_eq!(doc.size_bytes, pdf.len() as u64);
        assert!(doc.path.starts_with(dir.path()));

        let (found, bytes) = storage.retrieve(&doc.id).await.unwrap();
        assert_eq!(found.id, doc.id);
        assert_eq!(bytes, pdf);

        // Served name works too
        assert!(storage.lookup(&doc.stored_name()).await.is_ok());
    }

    #[tokio::test]
    async fn test_store_rejects_non_pdf_despite_extension() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage_with_ttl(dir.path(), Duration::from_secs(60)).await;

        let result = storage.store(b"just some text", "notes.pdf").await;
        assert!(matches!(result, Err(StorageError::NotPdf(name)) if name == "notes.pdf"));
        assert_eq!(storage.len().await, 0);
    }

    #[tokio::test]
    async fn test_store_rejects_empty_and_oversized() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path(), Duration::from_secs(60), 16)
            .await
            .unwrap();

        assert!(matches!(storage.store(b"", "a.pdf").await, Err(StorageError::Empty)));
        assert!(matches!(
            storage.store(&sample_pdf(1), "a.pdf").await,
            Err(StorageError::TooLarge { limit: 16, .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_ids_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage_with_ttl(dir.path(), Duration::from_secs(60)).await;

        let unknown = Uuid::new_v4().to_string();
        assert!(matches!(
            storage.lookup(&unknown).await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            storage.lookup("../../etc/passwd").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_entries_report_expired_then_get_swept() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage_with_ttl(dir.path(), Duration::ZERO).await;

        let doc = storage.store(&sample_pdf(1), "a.pdf").await.unwrap();
        assert!(matches!(
            storage.lookup(&doc.id).await,
            Err(StorageError::Expired(_))
        ));

        assert_eq!(storage.sweep_expired().await, 1);
        assert!(!doc.path.exists());
        assert!(matches!(
            storage.lookup(&doc.id).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_sweep_keeps_live_entries() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage_with_ttl(dir.path(), Duration::from_secs(3600)).await;

        let doc = storage.store(&sample_pdf(1), "a.pdf").await.unwrap();
        assert_eq!(storage.sweep_expired().await, 0);
        assert!(doc.path.exists());
    }

    #[tokio::test]
    async fn test_purge_all_deletes_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage_with_ttl(dir.path(), Duration::from_secs(60)).await;

        let a = storage.store(&sample_pdf(1), "a.pdf").await.unwrap();
        let b = storage.store(&sample_pdf(1), "b.pdf").await.unwrap();

        assert_eq!(storage.purge_all().await, 2);
        assert!(!a.path.exists());
        assert!(!b.path.exists());
        assert_eq!(storage.len().await, 0);
    }

    #[tokio::test]
    async fn test_open_removes_stale_generated_files() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join(format!("{}.pdf", Uuid::new_v4()));
        let unrelated = dir.path().join("keep-me.pdf");
        std::fs::write(&stale, b"%PDF-1.7").unwrap();
        std::fs::write(&unrelated, b"%PDF-1.7").unwrap();

        storage_with_ttl(dir.path(), Duration::from_secs(60)).await;

        assert!(!stale.exists());
        assert!(unrelated.exists());
    }

    #[tokio::test]
    async fn test_register_generated_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage_with_ttl(dir.path(), Duration::from_secs(60)).await;

        let (id, path) = storage.allocate(DocumentKind::Archive);
        assert!(path.to_string_lossy().ends_with(".zip"));
        std::fs::write(&path, b"PK").unwrap();

        let doc = storage
            .register(id.clone(), path, "batch.zip".into(), DocumentKind::Archive)
            .await
            .unwrap();
        assert_eq!(doc.size_bytes, 2);
        assert_eq!(doc.download_url(), format!("/download/{}.zip", id));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("../../secret.pdf"), "secret.pdf");
        assert_eq!(sanitize_filename("C:\\docs\\a.pdf"), "a.pdf");
        assert_eq!(sanitize_filename(""), "document.pdf");
        assert_eq!(sanitize_filename(".."), "document.pdf");
    }
}
