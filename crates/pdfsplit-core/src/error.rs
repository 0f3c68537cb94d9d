use thiserror::Error;

/// Errors produced while turning a page spec into a [`PageSelection`].
///
/// [`PageSelection`]: crate::selection::PageSelection
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("Invalid page spec token: '{0}'")]
    InvalidSyntax(String),

    #[error("Page {page} is out of range (1-{page_count})")]
    InvalidRange { page: u64, page_count: u32 },

    #[error("Page selection is empty")]
    EmptySelection,
}

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("Failed to read PDF: {0}")]
    Unreadable(String),

    #[error("Page {page} does not exist (document has {page_count} pages)")]
    InvalidPage { page: u32, page_count: u32 },

    #[error("Failed to write PDF: {0}")]
    WriteFailure(String),
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Pdf(#[from] PdfError),
}

impl SelectionError {
    pub fn code(&self) -> &'static str {
        match self {
            SelectionError::InvalidSyntax(_) => "INVALID_SYNTAX",
            SelectionError::InvalidRange { .. } => "INVALID_RANGE",
            SelectionError::EmptySelection => "EMPTY_SELECTION",
        }
    }
}

impl PdfError {
    pub fn code(&self) -> &'static str {
        match self {
            PdfError::Unreadable(_) => "UNREADABLE",
            PdfError::InvalidPage { .. } => "INVALID_RANGE",
            PdfError::WriteFailure(_) => "WRITE_FAILURE",
        }
    }
}

impl CoreError {
    /// Stable machine-readable code, shared with the HTTP error body.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Selection(e) => e.code(),
            CoreError::Pdf(e) => e.code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(
            CoreError::from(SelectionError::EmptySelection).code(),
            "EMPTY_SELECTION"
        );
        assert_eq!(
            CoreError::from(PdfError::WriteFailure("disk full".into())).code(),
            "WRITE_FAILURE"
        );
    }

    #[test]
    fn test_range_message_names_bounds() {
        let err = SelectionError::InvalidRange {
            page: 12,
            page_count: 5,
        };
        assert_eq!(err.to_string(), "Page 12 is out of range (1-5)");
    }
}
