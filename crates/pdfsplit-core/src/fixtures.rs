//! Small synthetic PDFs for tests
//!
//! Fonts and page size live on the root `Pages` node, so every page relies on
//! inherited attributes the way many real files do.

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream, StringFormat};

/// Document information written into the trailer's `Info` dictionary
pub struct SampleInfo<'a> {
    pub title: &'a str,
    pub author: &'a str,
    pub creation_date: &'a str,
}

/// A PDF with `num_pages` pages reading "Page 1", "Page 2", ...
pub fn sample_pdf(num_pages: u32) -> Vec<u8> {
    let texts: Vec<String> = (1..=num_pages).map(|i| format!("Page {}", i)).collect();
    let texts: Vec<&str> = texts.iter().map(String::as_str).collect();
    sample_pdf_with_texts(&texts, None)
}

/// A PDF with one page per entry; an empty entry makes a page with no text
pub fn sample_pdf_with_texts(texts: &[&str], info: Option<SampleInfo<'_>>) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"Type1".to_vec())),
        ("BaseFont", Object::Name(b"Helvetica".to_vec())),
        ("Encoding", Object::Name(b"WinAnsiEncoding".to_vec())),
    ]));
    let resources = Dictionary::from_iter(vec![(
        "Font",
        Object::Dictionary(Dictionary::from_iter(vec![("F1", Object::Reference(font_id))])),
    )]);

    let mut page_ids = Vec::new();
    for text in texts {
        let operations = if text.is_empty() {
            vec![]
        } else {
            vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(12)]),
                Operation::new("Td", vec![Object::Integer(100), Object::Integer(700)]),
                Operation::new(
                    "Tj",
                    vec![Object::String(
                        text.as_bytes().to_vec(),
                        StringFormat::Literal,
                    )],
                ),
                Operation::new("ET", vec![]),
            ]
        };
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            Dictionary::new(),
            content.encode().unwrap_or_default(),
        ));

        let page = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
            ("Contents", Object::Reference(content_id)),
        ]);
        page_ids.push(doc.add_object(page));
    }

    let pages = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Count", Object::Integer(page_ids.len() as i64)),
        (
            "Kids",
            Object::Array(page_ids.iter().map(|id| Object::Reference(*id)).collect()),
        ),
        ("Resources", Object::Dictionary(resources)),
        (
            "MediaBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ]),
        ),
    ]);
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    if let Some(info) = info {
        let literal = |s: &str| Object::String(s.as_bytes().to_vec(), StringFormat::Literal);
        let info_id = doc.add_object(Dictionary::from_iter(vec![
            ("Title", literal(info.title)),
            ("Author", literal(info.author)),
            ("CreationDate", literal(info.creation_date)),
        ]));
        doc.trailer.set("Info", Object::Reference(info_id));
    }

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).expect("fixture PDF saves");
    buffer
}
