//! Progress-callback trait for per-output pipeline events.
//!
//! Inject an [`Arc<dyn SplitProgressCallback>`] via
//! [`crate::config::SplitConfigBuilder::progress_callback`] to receive events
//! as the pipeline writes each output.
//!
//! Callbacks fire from concurrently running page tasks, so implementations
//! must be `Send + Sync` and guard any shared mutable state.
//!
//! # Example
//!
//! ```rust
//! use pdf_pagesplit::{SplitConfig, SplitProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     written: AtomicUsize,
//! }
//!
//! impl SplitProgressCallback for CountingCallback {
//!     fn on_output_complete(&self, key: &str, bytes: usize) {
//!         self.written.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("wrote {key} ({bytes} bytes)");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { written: AtomicUsize::new(0) });
//!
//! let config = SplitConfig::builder()
//!     .progress_callback(counter as Arc<dyn SplitProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it produces each output.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait SplitProgressCallback: Send + Sync {
    /// Called once after the source is loaded, before any output task starts.
    ///
    /// # Arguments
    /// * `page_count`: pages in the source document
    /// * `total_outputs`: outputs that will be attempted (raster + extracts)
    fn on_split_start(&self, page_count: usize, total_outputs: usize) {
        let _ = (page_count, total_outputs);
    }

    /// Called when an output has been durably written.
    fn on_output_complete(&self, key: &str, bytes: usize) {
        let _ = (key, bytes);
    }

    /// Called when producing or writing an output failed.
    fn on_output_error(&self, key: &str, error: &str) {
        let _ = (key, error);
    }

    /// Called once after every output task has finished.
    ///
    /// # Arguments
    /// * `total_outputs`: outputs attempted
    /// * `success_count`: outputs written without error
    fn on_split_complete(&self, total_outputs: usize, success_count: usize) {
        let _ = (total_outputs, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl SplitProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::SplitConfig`].
pub type ProgressCallback = Arc<dyn SplitProgressCallback>;
