//! Page subset construction
//!
//! Builds a new document from an ordered list of pages:
//! 1. Copy inheritable attributes down from the page tree onto each page
//! 2. Point every selected page (or a copy, for repeats) at the root node
//! 3. Replace the root's kids with the new order, flattening the tree
//! 4. Null out every remaining reference to an unselected page (outline and
//!    link destinations, named destinations, form widgets, structure
//!    elements), so nothing keeps those pages reachable
//! 5. Prune objects no longer reachable and compress

use std::collections::{BTreeMap, HashSet};

use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::error::PdfError;

/// Page attributes a page may inherit from its ancestors in the page tree
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Guards against cyclic Parent chains in damaged files
const MAX_TREE_DEPTH: usize = 64;

pub(crate) fn build_subset(
    source: &Document,
    pages: &BTreeMap<u32, ObjectId>,
    order: &[u32],
) -> Result<Document, PdfError> {
    if order.is_empty() {
        return Err(PdfError::WriteFailure("No pages specified".into()));
    }

    let mut doc = source.clone();
    let root_id = page_tree_root(&doc)?;

    let mut kids = Vec::with_capacity(order.len());
    let mut placed = HashSet::new();
    let selected: HashSet<ObjectId> = order.iter().filter_map(|p| pages.get(p).copied()).collect();
    let dropped: HashSet<ObjectId> = pages
        .values()
        .filter(|id| !selected.contains(id))
        .copied()
        .collect();

    for &page in order {
        let page_id = *pages.get(&page).ok_or(PdfError::InvalidPage {
            page,
            page_count: pages.len() as u32,
        })?;

        let mut dict = source
            .get_dictionary(page_id)
            .map_err(|e| PdfError::WriteFailure(format!("Page {} is damaged: {}", page, e)))?
            .clone();
        inherit_attributes(source, &mut dict);
        dict.set("Parent", Object::Reference(root_id));

        let id = if placed.insert(page_id) {
            doc.objects.insert(page_id, Object::Dictionary(dict));
            page_id
        } else {
            doc.add_object(Object::Dictionary(dict))
        };
        kids.push(Object::Reference(id));
    }

    let root = doc
        .get_dictionary_mut(root_id)
        .map_err(|e| PdfError::WriteFailure(format!("Page tree is damaged: {}", e)))?;
    root.set("Count", Object::Integer(kids.len() as i64));
    root.set("Kids", Object::Array(kids));

    if !dropped.is_empty() {
        for id in &dropped {
            doc.objects.remove(id);
        }
        for object in doc.objects.values_mut() {
            detach_dropped(object, &dropped);
        }
    }

    doc.prune_objects();
    doc.compress();

    Ok(doc)
}

/// Replace references to dropped pages with null.
///
/// A null dictionary value is the same as an absent key, so a bookmark or
/// link into a dropped page loses its destination instead of dragging the
/// page along.
fn detach_dropped(object: &mut Object, dropped: &HashSet<ObjectId>) {
    match object {
        Object::Reference(id) if dropped.contains(id) => *object = Object::Null,
        Object::Array(items) => {
            for item in items.iter_mut() {
                detach_dropped(item, dropped);
            }
        }
        Object::Dictionary(dict) => {
            for (_, value) in dict.iter_mut() {
                detach_dropped(value, dropped);
            }
        }
        Object::Stream(stream) => {
            for (_, value) in stream.dict.iter_mut() {
                detach_dropped(value, dropped);
            }
        }
        _ => {}
    }
}

fn page_tree_root(doc: &Document) -> Result<ObjectId, PdfError> {
    doc.trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .and_then(|id| doc.get_dictionary(id))
        .and_then(|catalog| catalog.get(b"Pages"))
        .and_then(Object::as_reference)
        .map_err(|e| PdfError::WriteFailure(format!("Missing page tree: {}", e)))
}

fn inherit_attributes(source: &Document, page: &mut Dictionary) {
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;

    while let Some(node_id) = parent {
        depth += 1;
        if depth > MAX_TREE_DEPTH {
            break;
        }
        let Ok(node) = source.get_dictionary(node_id) else {
            break;
        };
        for key in INHERITABLE {
            if !page.has(key) {
                if let Ok(value) = node.get(key) {
                    page.set(key.to_vec(), value.clone());
                }
            }
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
}
