//! Source loading: validate and parse the input PDF once per invocation.
//!
//! The parsed page tree and the raw bytes are both kept: the extractor walks
//! the `lopdf` object graph, while the pdfium renderer needs the original
//! byte buffer. Both are immutable after load and shared across page tasks
//! through an `Arc<SourceDocument>`.

use crate::error::{OutputError, PageSplitError};
use lopdf::{Document, ObjectId};
use std::sync::Arc;
use tracing::debug;

/// PDF files may carry junk before the header; readers accept the header
/// anywhere in the first kilobyte.
const HEADER_SEARCH_WINDOW: usize = 1024;

/// A parsed, read-only source document.
#[derive(Debug)]
pub struct SourceDocument {
    bytes: Arc<[u8]>,
    document: Document,
    page_ids: Vec<ObjectId>,
}

impl SourceDocument {
    /// Parse `bytes` as a PDF and index its pages.
    ///
    /// # Errors
    /// [`PageSplitError::MalformedDocument`] when the header is missing or the
    /// page tree cannot be parsed.
    pub fn load(bytes: impl Into<Arc<[u8]>>) -> Result<Self, PageSplitError> {
        let bytes: Arc<[u8]> = bytes.into();

        if !has_pdf_header(&bytes) {
            let mut magic = [0u8; 4];
            let n = bytes.len().min(4);
            magic[..n].copy_from_slice(&bytes[..n]);
            return Err(PageSplitError::MalformedDocument {
                detail: format!("missing %PDF- header (first bytes: {magic:?})"),
            });
        }

        let document = Document::load_mem(&bytes).map_err(|e| PageSplitError::MalformedDocument {
            detail: e.to_string(),
        })?;

        // `get_pages` is keyed by 1-based page number, so values come out in
        // page order.
        let page_ids: Vec<ObjectId> = document.get_pages().into_values().collect();
        debug!(
            "Source PDF {} parsed: {} pages, {} bytes",
            document.version,
            page_ids.len(),
            bytes.len()
        );

        Ok(Self {
            bytes,
            document,
            page_ids,
        })
    }

    /// Number of pages in the document.
    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    /// Original bytes, as handed to the renderer.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Parsed object graph.
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Object id of the page at `index`, or `InvalidPageIndex`.
    pub fn page_id(&self, index: usize) -> Result<ObjectId, OutputError> {
        self.ensure_page(index)?;
        Ok(self.page_ids[index])
    }

    /// Check the `0 <= index < page_count` precondition.
    pub fn ensure_page(&self, index: usize) -> Result<(), OutputError> {
        if index >= self.page_count() {
            return Err(OutputError::InvalidPageIndex {
                index,
                page_count: self.page_count(),
            });
        }
        Ok(())
    }
}

fn has_pdf_header(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(HEADER_SEARCH_WINDOW)];
    window.windows(5).any(|w| w == b"%PDF-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::sample_pdf;

    #[test]
    fn loads_pages_in_order() {
        let doc = SourceDocument::load(sample_pdf(&[(612.0, 792.0), (200.0, 100.0)])).unwrap();
        assert_eq!(doc.page_count(), 2);
        assert!(doc.page_id(0).is_ok());
        assert!(doc.page_id(1).is_ok());
        assert_ne!(doc.page_id(0).unwrap(), doc.page_id(1).unwrap());
    }

    #[test]
    fn rejects_non_pdf_bytes() {
        let err = SourceDocument::load(b"GIF89a not a pdf".to_vec()).unwrap_err();
        assert!(matches!(err, PageSplitError::MalformedDocument { .. }), "{err:?}");
    }

    #[test]
    fn rejects_truncated_pdf() {
        let err = SourceDocument::load(b"%PDF-1.5\n1 0 obj\n<<".to_vec()).unwrap_err();
        assert!(matches!(err, PageSplitError::MalformedDocument { .. }), "{err:?}");
    }

    #[test]
    fn empty_input_is_malformed() {
        assert!(SourceDocument::load(Vec::new()).is_err());
    }

    #[test]
    fn zero_page_document_loads() {
        let doc = SourceDocument::load(sample_pdf(&[])).unwrap();
        assert_eq!(doc.page_count(), 0);
        assert_eq!(
            doc.ensure_page(0),
            Err(OutputError::InvalidPageIndex {
                index: 0,
                page_count: 0
            })
        );
    }

    #[test]
    fn header_after_leading_junk_is_accepted() {
        let mut bytes = b"\xEF\xBB\xBFjunk\n".to_vec();
        bytes.extend(sample_pdf(&[(100.0, 100.0)]));
        // lopdf may or may not tolerate the offset; the header check must not
        // be what rejects it.
        assert!(has_pdf_header(&bytes));
    }
}
