//! Error types for the pdf-pagesplit library.
//!
//! Three error types map to three distinct failure scopes:
//!
//! * [`PageSplitError`] (**fatal**): the invocation cannot proceed or has
//!   finished unsuccessfully as a whole (bad input bytes, source object
//!   missing, invalid parameters). Carried inside a failed
//!   [`crate::output::InvocationState`] and returned by
//!   [`crate::output::InvocationResult::into_result`].
//!
//! * [`OutputError`] (**non-fatal**): a single output (the page raster or one
//!   page extract) failed. Stored inside [`crate::output::OperationOutcome`]
//!   so the other outputs of the same invocation still run to completion.
//!
//! * [`StoreError`]: raised by an [`crate::storage::ObjectStore`]
//!   implementation. The pipeline maps it onto one of the two types above
//!   depending on whether it happened while fetching the source or writing an
//!   output.

use thiserror::Error;

/// All fatal errors returned by the pdf-pagesplit library.
///
/// Per-output failures use [`OutputError`] and are stored in
/// [`crate::output::OperationOutcome`] rather than propagated here.
#[derive(Debug, Error)]
pub enum PageSplitError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The source bytes do not parse as a paginated PDF document.
    #[error("Source is not a valid PDF document: {detail}")]
    MalformedDocument { detail: String },

    /// The invocation parameters are out of range or of the wrong shape.
    #[error("Invalid invocation parameters: {0}")]
    InvalidParams(String),

    /// The source object key could not be decoded.
    #[error("Invalid source key '{key}': {detail}")]
    InvalidSourceKey { key: String, detail: String },

    /// Fetching the source object from the store failed.
    #[error("Failed to fetch s3://{bucket}/{key}: {detail}")]
    SourceFetchFailed {
        bucket: String,
        key: String,
        detail: String,
    },

    // ── Outcome errors ────────────────────────────────────────────────────
    /// At least one output failed. Outputs that succeeded stay written.
    #[error("{failed}/{total} outputs failed; first error: {first_error}")]
    PartialFailure {
        failed: usize,
        total: usize,
        first_error: String,
    },

    /// The invocation deadline passed before every output finished.
    #[error("Invocation timed out after {secs}s; in-flight outputs were abandoned")]
    TimedOut { secs: u64 },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium, pass --pdfium-lib, or install\n\
libpdfium where the system loader can find it.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single output.
///
/// Page numbers in messages are the zero-based indices used for addressing;
/// extract keys use the one-based page number.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum OutputError {
    /// The requested page does not exist in the source document.
    #[error("page index {index} is out of range (document has {page_count} pages)")]
    InvalidPageIndex { index: usize, page_count: usize },

    /// Rendering or encoding the page raster failed.
    #[error("page {page}: rasterisation failed: {detail}")]
    RasterizationFailed { page: usize, detail: String },

    /// Copying the page into a standalone document failed.
    #[error("page {page}: extraction failed: {detail}")]
    ExtractionFailed { page: usize, detail: String },

    /// The durable write of an output object failed.
    #[error("write of '{key}' failed: {detail}")]
    StorageWriteFailed { key: String, detail: String },
}

/// Errors raised by object store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested object does not exist.
    #[error("object s3://{bucket}/{key} not found")]
    NotFound { bucket: String, key: String },

    /// The backend rejected or failed the request.
    #[error("{0}")]
    Backend(String),

    /// Local filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
