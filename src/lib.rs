//! # pdf-pagesplit
//!
//! Split a PDF held in an object store into single-page PDFs plus a
//! fixed-size image of one page, and write everything back to the store.
//!
//! ## What one invocation produces
//!
//! For a source key `docs/report.pdf` with three pages and a `webp` 300x400
//! request:
//!
//! ```text
//! docs/0.webp          300x400 raster of page index 0   image/webp
//! docs/report-1.pdf    page 1 as a standalone PDF        application/pdf
//! docs/report-2.pdf    page 2                            application/pdf
//! docs/report-3.pdf    page 3                            application/pdf
//! ```
//!
//! The invocation reports success only when every output was written.
//!
//! ## Pipeline Overview
//!
//! ```text
//! object store
//!  │
//!  ├─ 1. Fetch    source bytes through the ObjectStore capability
//!  ├─ 2. Load     validate header, parse page tree (lopdf)
//!  ├─ 3. Raster   render designated page (pdfium), crop/pad, encode  ┐ bounded
//!  ├─ 4. Extract  copy each page into its own PDF (lopdf)            ┘ fan-out
//!  ├─ 5. Store    put every output under its deterministic key
//!  └─ 6. Report   {statusCode: 200|400, message}
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_pagesplit::{handle_invocation, InvocationEvent, PdfiumRenderer, S3ObjectStore, SplitConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = SplitConfig::default();
//!     let store = Arc::new(S3ObjectStore::from_env().await);
//!     let renderer = Arc::new(PdfiumRenderer::from_config(&config));
//!
//!     let event: InvocationEvent = serde_json::from_str(
//!         r#"{"bucket":"uploads","pdfkey":"docs/report.pdf","format":"webp","width":300,"height":400}"#,
//!     ).unwrap();
//!
//!     let response = handle_invocation(store, renderer, config, &event).await;
//!     println!("{}", serde_json::to_string(&response).unwrap());
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pagesplit` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf-pagesplit = { version = "0.1", default-features = false }
//! ```
//!
//! ## Rendering
//!
//! Rasterisation goes through the [`PageRenderer`] trait. The default
//! [`PdfiumRenderer`] needs the pdfium shared library at runtime: pass its
//! path in [`SplitConfig::pdfium_library_path`], set `PDFIUM_LIB_PATH`, put
//! it in the working directory, or install it on the loader path. Page
//! extraction is pure Rust and never needs pdfium.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod storage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ConversionParams, FitMode, InvocationEvent, RasterFormat, SplitConfig, SplitConfigBuilder,
};
pub use convert::{handle_event_value, handle_invocation, Decomposer, SplitRequest};
pub use error::{OutputError, PageSplitError, StoreError};
pub use output::{
    InvocationResponse, InvocationResult, InvocationState, InvocationStats, OperationOutcome,
    OutputKind,
};
pub use pipeline::render::{PageRenderer, PdfiumRenderer};
pub use progress::{NoopProgressCallback, ProgressCallback, SplitProgressCallback};
pub use storage::{LocalObjectStore, MemoryObjectStore, ObjectSink, ObjectStore, S3ObjectStore};
