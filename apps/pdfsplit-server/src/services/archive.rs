//! ZIP packaging of batch outputs

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::run_blocking;
use crate::error::ApiError;
use crate::storage::{DocumentKind, Storage, StoredDocument};

/// Pack `outputs` into one stored archive, one entry per output in order
pub async fn build_archive(
    storage: &Storage,
    outputs: &[StoredDocument],
) -> Result<StoredDocument, ApiError> {
    let entries = entry_names(outputs.iter().map(|doc| doc.filename.as_str()))
        .into_iter()
        .zip(outputs.iter().map(|doc| doc.path.clone()))
        .collect::<Vec<_>>();
    let count = entries.len();

    let (id, path) = storage.allocate(DocumentKind::Archive);
    let target = path.clone();
    if let Err(e) = run_blocking(move || write_zip(&target, &entries)).await {
        let _ = tokio::fs::remove_file(&path).await;
        return Err(e);
    }

    let archive = storage
        .register(id, path, "extracted_pages.zip".to_string(), DocumentKind::Archive)
        .await?;
    debug!("Archived {} outputs into {}", count, archive.id);
    Ok(archive)
}

fn write_zip(target: &Path, entries: &[(String, PathBuf)]) -> Result<(), ApiError> {
    let file = File::create(target).map_err(zip_failure)?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, source) in entries {
        let bytes = std::fs::read(source).map_err(zip_failure)?;
        zip.start_file(name.as_str(), options).map_err(zip_failure)?;
        zip.write_all(&bytes).map_err(zip_failure)?;
    }

    let mut writer = zip.finish().map_err(zip_failure)?;
    writer.flush().map_err(zip_failure)?;
    Ok(())
}

fn zip_failure(e: impl std::fmt::Display) -> ApiError {
    ApiError::Internal(format!("Failed to build archive: {}", e))
}

/// Make entry names unique by appending `_2`, `_3`, ... before the extension
fn entry_names<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .map(|name| {
            if seen.insert(name.to_string()) {
                return name.to_string();
            }
            let (stem, ext) = match name.rsplit_once('.') {
                Some((stem, ext)) => (stem, format!(".{}", ext)),
                None => (name, String::new()),
            };
            let mut n = 2;
            loop {
                let candidate = format!("{}_{}{}", stem, n, ext);
                if seen.insert(candidate.clone()) {
                    return candidate;
                }
                n += 1;
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::time::Duration;

    use pdfsplit_core::fixtures::sample_pdf;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_entry_names_are_unique() {
        let names = entry_names(
            ["a.pdf", "b.pdf", "a.pdf", "a.pdf", "a_2.pdf"].into_iter(),
        );
        assert_eq!(names, vec!["a.pdf", "b.pdf", "a_2.pdf", "a_3.pdf", "a_2_2.pdf"]);
    }

    #[tokio::test]
    async fn test_build_archive_contains_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path(), Duration::from_secs(60), 1024 * 1024)
            .await
            .unwrap();
        let first_pdf = sample_pdf(1);
        let one = storage.store(&first_pdf, "same.pdf").await.unwrap();
        let two = storage.store(&sample_pdf(2), "same.pdf").await.unwrap();

        let archive = build_archive(&storage, &[one, two]).await.unwrap();
        assert_eq!(archive.kind, DocumentKind::Archive);

        let mut zip = zip::ZipArchive::new(File::open(&archive.path).unwrap()).unwrap();
        assert_eq!(zip.len(), 2);
        let mut names: Vec<String> = zip.file_names().map(String::from).collect();
        names.sort();
        assert_eq!(names, vec!["same.pdf", "same_2.pdf"]);

        let mut first = Vec::new();
        zip.by_name("same.pdf").unwrap().read_to_end(&mut first).unwrap();
        assert_eq!(first, first_pdf);
    }
}
