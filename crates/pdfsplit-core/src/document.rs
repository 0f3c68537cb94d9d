//! PDF access over lopdf
//!
//! [`PdfDocument`] owns one parsed document. Every job opens its own handle;
//! nothing here is shared between requests.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use lopdf::{Dictionary, Document, Object, ObjectId};
use serde::Serialize;

use crate::error::PdfError;
use crate::selection::PageSelection;
use crate::subset::build_subset;

/// How far into a file the `%PDF-` header may start.
///
/// Readers tolerate junk before the header, so the sniff does too.
const HEADER_SEARCH_WINDOW: usize = 1024;

/// Signature sniff: does this look like a PDF, whatever its filename says?
pub fn looks_like_pdf(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(HEADER_SEARCH_WINDOW + 4)];
    head.windows(5).any(|w| w == b"%PDF-")
}

/// Document information dictionary, with missing fields left as `None`
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
    pub total_pages: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageText {
    pub page: u32,
    pub text: String,
}

/// Render page texts as `=== Page N ===` blocks separated by blank lines
pub fn format_page_texts(pages: &[PageText]) -> String {
    pages
        .iter()
        .map(|p| format!("=== Page {} ===\n{}", p.page, p.text.trim_end()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub struct PdfDocument {
    doc: Document,
    pages: BTreeMap<u32, ObjectId>,
}

impl PdfDocument {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PdfError> {
        let path = path.as_ref();
        let doc = Document::load(path)
            .map_err(|e| PdfError::Unreadable(format!("{}: {}", path.display(), e)))?;
        Self::from_document(doc)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PdfError> {
        let doc = Document::load_mem(bytes).map_err(|e| PdfError::Unreadable(e.to_string()))?;
        Self::from_document(doc)
    }

    fn from_document(doc: Document) -> Result<Self, PdfError> {
        if doc.trailer.get(b"Encrypt").is_ok() {
            return Err(PdfError::Unreadable(
                "document is encrypted and no password was supplied".into(),
            ));
        }
        let pages = doc.get_pages();
        Ok(PdfDocument { doc, pages })
    }

    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    pub fn metadata(&self) -> DocumentMetadata {
        let mut meta = DocumentMetadata {
            total_pages: self.page_count(),
            ..Default::default()
        };

        let info = match self.doc.trailer.get(b"Info") {
            Ok(Object::Reference(id)) => self.doc.get_dictionary(*id).ok(),
            Ok(Object::Dictionary(dict)) => Some(dict),
            _ => None,
        };

        if let Some(dict) = info {
            meta.title = get_string_from_dict(dict, b"Title");
            meta.author = get_string_from_dict(dict, b"Author");
            meta.subject = get_string_from_dict(dict, b"Subject");
            meta.keywords = get_string_from_dict(dict, b"Keywords");
            meta.creator = get_string_from_dict(dict, b"Creator");
            meta.producer = get_string_from_dict(dict, b"Producer");
            meta.creation_date = get_string_from_dict(dict, b"CreationDate").map(normalize_date);
            meta.modification_date = get_string_from_dict(dict, b"ModDate").map(normalize_date);
        }

        meta
    }

    /// Text of one page; empty when the page has nothing extractable
    pub fn extract_text(&self, page: u32) -> Result<String, PdfError> {
        self.check_page(page)?;
        Ok(self.doc.extract_text(&[page]).unwrap_or_default())
    }

    pub fn extract_text_pages(&self, selection: &PageSelection) -> Result<Vec<PageText>, PdfError> {
        selection
            .iter()
            .map(|page| {
                Ok(PageText {
                    page,
                    text: self.extract_text(page)?,
                })
            })
            .collect()
    }

    /// Build a new document holding exactly `order`'s pages, in that order.
    ///
    /// Repeated page numbers produce repeated pages.
    pub fn subset(&self, order: &[u32]) -> Result<Document, PdfError> {
        for &page in order {
            self.check_page(page)?;
        }
        build_subset(&self.doc, &self.pages, order)
    }

    pub fn subset_bytes(&self, order: &[u32]) -> Result<Vec<u8>, PdfError> {
        let mut doc = self.subset(order)?;
        let mut buffer = Vec::new();
        doc.save_to(&mut buffer)
            .map_err(|e| PdfError::WriteFailure(format!("Save failed: {}", e)))?;
        Ok(buffer)
    }

    /// Write the subset to `out_path`, returning the number of bytes written.
    ///
    /// The file is written next to its destination and renamed into place,
    /// so a failure never leaves a partial output behind.
    pub fn write_subset<P: AsRef<Path>>(&self, order: &[u32], out_path: P) -> Result<u64, PdfError> {
        let out_path = out_path.as_ref();
        let bytes = self.subset_bytes(order)?;

        let partial = out_path.with_extension("partial");
        std::fs::write(&partial, &bytes).map_err(|e| {
            PdfError::WriteFailure(format!("{}: {}", partial.display(), e))
        })?;
        if let Err(e) = std::fs::rename(&partial, out_path) {
            let _ = std::fs::remove_file(&partial);
            return Err(PdfError::WriteFailure(format!(
                "{}: {}",
                out_path.display(),
                e
            )));
        }

        Ok(bytes.len() as u64)
    }

    fn check_page(&self, page: u32) -> Result<(), PdfError> {
        if page == 0 || !self.pages.contains_key(&page) {
            return Err(PdfError::InvalidPage {
                page,
                page_count: self.page_count(),
            });
        }
        Ok(())
    }
}

fn get_string_from_dict(dict: &Dictionary, key: &[u8]) -> Option<String> {
    dict.get(key).ok().and_then(|obj| match obj {
        Object::String(bytes, _) => decode_pdf_string(bytes),
        _ => None,
    })
}

fn decode_pdf_string(bytes: &[u8]) -> Option<String> {
    let text = if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        // UTF-16 BE
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
            .collect();
        String::from_utf16(&units).ok()?
    } else {
        // PDFDocEncoding, close enough to Latin-1 for metadata
        bytes.iter().map(|&b| b as char).collect()
    };

    let text = text.trim_matches('\0').trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// RFC 3339 when the PDF date parses, the raw string otherwise
fn normalize_date(raw: String) -> String {
    parse_pdf_date(&raw)
        .map(|date| date.to_rfc3339())
        .unwrap_or(raw)
}

/// Parse a PDF date: `D:YYYYMMDDHHmmSSOHH'mm'`, every part after the year optional
fn parse_pdf_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let s = raw.trim();
    let s = s.strip_prefix("D:").unwrap_or(s);

    let digit_len = s.bytes().take_while(u8::is_ascii_digit).count();
    let digits = &s[..digit_len];
    let part = |start: usize, len: usize, default: u32| match digits.get(start..start + len) {
        Some(v) => v.parse::<u32>().ok(),
        None => Some(default),
    };

    let year: i32 = digits.get(0..4)?.parse().ok()?;
    let month = part(4, 2, 1)?;
    let day = part(6, 2, 1)?;
    let hour = part(8, 2, 0)?;
    let minute = part(10, 2, 0)?;
    let second = part(12, 2, 0)?;

    let offset = FixedOffset::east_opt(parse_pdf_offset(&s[digit_len..])?)?;
    let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)?;
    offset.from_local_datetime(&naive).single()
}

fn parse_pdf_offset(rest: &str) -> Option<i32> {
    let mut chars = rest.trim().chars();
    match chars.next() {
        None | Some('Z') | Some('z') => Some(0),
        Some(sign @ ('+' | '-')) => {
            let digits: String = chars.filter(char::is_ascii_digit).collect();
            let hours: i32 = digits.get(0..2)?.parse().ok()?;
            let minutes: i32 = digits.get(2..4).and_then(|m| m.parse().ok()).unwrap_or(0);
            let seconds = hours * 3600 + minutes * 60;
            Some(if sign == '-' { -seconds } else { seconds })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{sample_pdf, sample_pdf_with_texts, SampleInfo};
    use crate::selection::resolve;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sniff_accepts_pdf_header() {
        assert!(looks_like_pdf(b"%PDF-1.7\n..."));
        assert!(looks_like_pdf(b"\xEF\xBB\xBF  %PDF-1.4"));
    }

    #[test]
    fn test_sniff_rejects_other_content() {
        assert!(!looks_like_pdf(b""));
        assert!(!looks_like_pdf(b"PK\x03\x04 zip archive"));
        assert!(!looks_like_pdf(b"Hello, this is just text named report.pdf"));
    }

    #[test]
    fn test_open_garbage_is_unreadable() {
        let result = PdfDocument::from_bytes(b"%PDF-1.7 but nothing else");
        assert!(matches!(result, Err(PdfError::Unreadable(_))));
    }

    #[test]
    fn test_page_count() {
        let doc = PdfDocument::from_bytes(&sample_pdf(4)).unwrap();
        assert_eq!(doc.page_count(), 4);
    }

    #[test]
    fn test_metadata_reads_info_dictionary() {
        let bytes = sample_pdf_with_texts(
            &["one"],
            Some(SampleInfo {
                title: "Quarterly Report",
                author: "Finance",
                creation_date: "D:20240115103000+01'00'",
            }),
        );
        let meta = PdfDocument::from_bytes(&bytes).unwrap().metadata();
        assert_eq!(meta.title.as_deref(), Some("Quarterly Report"));
        assert_eq!(meta.author.as_deref(), Some("Finance"));
        assert_eq!(
            meta.creation_date.as_deref(),
            Some("2024-01-15T10:30:00+01:00")
        );
        assert_eq!(meta.producer, None);
        assert_eq!(meta.total_pages, 1);
    }

    #[test]
    fn test_metadata_missing_info_is_all_none() {
        let meta = PdfDocument::from_bytes(&sample_pdf(2)).unwrap().metadata();
        assert_eq!(
            meta,
            DocumentMetadata {
                total_pages: 2,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_pdf_dates() {
        assert_eq!(
            parse_pdf_date("D:20231231235959Z").map(|d| d.to_rfc3339()),
            Some("2023-12-31T23:59:59+00:00".to_string())
        );
        assert_eq!(
            parse_pdf_date("D:2023").map(|d| d.to_rfc3339()),
            Some("2023-01-01T00:00:00+00:00".to_string())
        );
        assert_eq!(
            parse_pdf_date("D:20230615-05'00").map(|d| d.to_rfc3339()),
            Some("2023-06-15T00:00:00-05:00".to_string())
        );
        assert_eq!(parse_pdf_date("yesterday"), None);
        assert_eq!(normalize_date("yesterday".into()), "yesterday");
    }

    #[test]
    fn test_utf16_strings_decode() {
        let mut bytes = vec![0xFE, 0xFF];
        for unit in "Café".encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        assert_eq!(decode_pdf_string(&bytes).as_deref(), Some("Café"));
    }

    #[test]
    fn test_extract_text_per_page() {
        let doc = PdfDocument::from_bytes(&sample_pdf_with_texts(&["alpha", "beta"], None)).unwrap();
        assert!(doc.extract_text(1).unwrap().contains("alpha"));
        assert!(doc.extract_text(2).unwrap().contains("beta"));
        assert!(matches!(
            doc.extract_text(3),
            Err(PdfError::InvalidPage { page: 3, .. })
        ));
    }

    #[test]
    fn test_blank_page_has_empty_text() {
        let doc = PdfDocument::from_bytes(&sample_pdf_with_texts(&["", "words"], None)).unwrap();
        assert_eq!(doc.extract_text(1).unwrap().trim(), "");
    }

    #[test]
    fn test_subset_keeps_requested_order() {
        let doc = PdfDocument::from_bytes(&sample_pdf(5)).unwrap();
        let out = PdfDocument::from_bytes(&doc.subset_bytes(&[4, 2]).unwrap()).unwrap();
        assert_eq!(out.page_count(), 2);
        assert_eq!(out.extract_text(1).unwrap(), doc.extract_text(4).unwrap());
        assert_eq!(out.extract_text(2).unwrap(), doc.extract_text(2).unwrap());
    }

    #[test]
    fn test_subset_repeats_pages() {
        let doc = PdfDocument::from_bytes(&sample_pdf(3)).unwrap();
        let out = PdfDocument::from_bytes(&doc.subset_bytes(&[1, 1, 2]).unwrap()).unwrap();
        assert_eq!(out.page_count(), 3);
        assert_eq!(out.extract_text(2).unwrap(), doc.extract_text(1).unwrap());
    }

    #[test]
    fn test_full_range_round_trip_preserves_text() {
        let doc = PdfDocument::from_bytes(&sample_pdf(6)).unwrap();
        let all = resolve("1-end", doc.page_count()).unwrap();
        let out = PdfDocument::from_bytes(&doc.subset_bytes(all.pages()).unwrap()).unwrap();

        assert_eq!(
            out.extract_text_pages(&PageSelection::all(6).unwrap()).unwrap(),
            doc.extract_text_pages(&all).unwrap()
        );
    }

    #[test]
    fn test_subset_rejects_missing_page() {
        let doc = PdfDocument::from_bytes(&sample_pdf(2)).unwrap();
        assert!(matches!(
            doc.subset(&[1, 9]),
            Err(PdfError::InvalidPage { page: 9, .. })
        ));
        assert!(doc.subset(&[0]).is_err());
    }

    #[test]
    fn test_write_subset_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("out.pdf");

        let doc = PdfDocument::from_bytes(&sample_pdf(3)).unwrap();
        let written = doc.write_subset(&[3], &out_path).unwrap();

        assert_eq!(std::fs::metadata(&out_path).unwrap().len(), written);
        assert!(!dir.path().join("out.partial").exists());
        assert_eq!(PdfDocument::open(&out_path).unwrap().page_count(), 1);
    }

    #[test]
    fn test_write_subset_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("missing").join("out.pdf");

        let doc = PdfDocument::from_bytes(&sample_pdf(1)).unwrap();
        assert!(matches!(
            doc.write_subset(&[1], &out_path),
            Err(PdfError::WriteFailure(_))
        ));
    }

    #[test]
    fn test_format_page_texts() {
        let pages = vec![
            PageText {
                page: 2,
                text: "two\n".into(),
            },
            PageText {
                page: 5,
                text: "five".into(),
            },
        ];
        assert_eq!(
            format_page_texts(&pages),
            "=== Page 2 ===\ntwo\n\n=== Page 5 ===\nfive"
        );
    }
}
