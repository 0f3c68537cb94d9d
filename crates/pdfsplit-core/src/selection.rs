//! Page selection parsing
//!
//! Turns a page spec like "1-3, 5, 8-end" into the ordered list of
//! 1-indexed pages to copy into an output document.
//!
//! Policy:
//! - descending ranges are normalized ascending ("5-2" is pages 2..=5)
//! - a page named twice is kept once, at its first position
//! - output order follows the page spec, so "3,1-2" puts page 3 first

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use crate::error::SelectionError;

/// A validated, non-empty, duplicate-free list of 1-indexed pages.
///
/// Only [`resolve`] and [`PageSelection::all`] construct one, so every page
/// is known to be within the document it was resolved against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PageSelection {
    pages: Vec<u32>,
}

impl PageSelection {
    /// Every page of a `page_count`-page document, in order
    pub fn all(page_count: u32) -> Result<Self, SelectionError> {
        if page_count == 0 {
            return Err(SelectionError::EmptySelection);
        }
        Ok(PageSelection {
            pages: (1..=page_count).collect(),
        })
    }

    pub fn pages(&self) -> &[u32] {
        &self.pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.pages.iter().copied()
    }

    pub fn into_vec(self) -> Vec<u32> {
        self.pages
    }
}

/// Compact spec form, collapsing ascending runs: `[1, 2, 3, 7, 5]` is "1-3,7,5"
impl fmt::Display for PageSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        let mut i = 0;
        while i < self.pages.len() {
            let start = self.pages[i];
            let mut end = start;
            while i + 1 < self.pages.len() && self.pages[i + 1] == end + 1 {
                end += 1;
                i += 1;
            }
            if !first {
                f.write_str(",")?;
            }
            first = false;
            if start == end {
                write!(f, "{}", start)?;
            } else {
                write!(f, "{}-{}", start, end)?;
            }
            i += 1;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageRef {
    Number(u64),
    End,
}

fn parse_page_ref(s: &str, token: &str) -> Result<PageRef, SelectionError> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("end") {
        return Ok(PageRef::End);
    }
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SelectionError::InvalidSyntax(token.to_string()));
    }
    // Digits that overflow are still a page number, just an out-of-range one
    Ok(PageRef::Number(s.parse::<u64>().unwrap_or(u64::MAX)))
}

fn to_page(page_ref: PageRef, page_count: u32) -> Result<u32, SelectionError> {
    let page = match page_ref {
        PageRef::Number(n) => n,
        PageRef::End => u64::from(page_count),
    };
    if page == 0 || page > u64::from(page_count) {
        return Err(SelectionError::InvalidRange { page, page_count });
    }
    Ok(page as u32)
}

/// Resolve a page spec against a document with `page_count` pages.
///
/// # Examples
/// ```
/// use pdfsplit_core::selection::resolve;
///
/// assert_eq!(resolve("1-3", 10).unwrap().pages(), &[1, 2, 3]);
/// assert_eq!(resolve("5, 2-1", 10).unwrap().pages(), &[5, 1, 2]);
/// assert_eq!(resolve("9-end", 10).unwrap().pages(), &[9, 10]);
/// assert!(resolve("0", 10).is_err());
/// ```
pub fn resolve(spec: &str, page_count: u32) -> Result<PageSelection, SelectionError> {
    let mut pages = Vec::new();
    let mut seen = HashSet::new();

    for part in spec.split(',') {
        let token = part.trim();
        if token.is_empty() {
            continue;
        }

        let (start, end) = match token.split_once('-') {
            Some((start, end)) => (parse_page_ref(start, token)?, parse_page_ref(end, token)?),
            None => {
                let page = parse_page_ref(token, token)?;
                (page, page)
            }
        };

        let start = to_page(start, page_count)?;
        let end = to_page(end, page_count)?;
        let (low, high) = if start <= end {
            (start, end)
        } else {
            (end, start)
        };

        for page in low..=high {
            if seen.insert(page) {
                pages.push(page);
            }
        }
    }

    if pages.is_empty() {
        return Err(SelectionError::EmptySelection);
    }

    Ok(PageSelection { pages })
}
