//! Page rendering backend: turn one page of a PDF into a `DynamicImage`.
//!
//! ## Why a trait?
//!
//! Rasterisation is the only step that needs a native library. Putting it
//! behind [`PageRenderer`] lets the pipeline, its tests and embedders swap in
//! another backend (or a deterministic fake) without touching fitting,
//! encoding or storage.
//!
//! ## Why bind per call?
//!
//! `Pdfium` is only `Send + Sync` with pdfium-render's `sync` feature, and
//! the library's global init/destroy pair is not reentrant. Each render binds,
//! renders and drops while holding the renderer's lock, so at most one pdfium
//! instance is alive per renderer. Callers run this inside `spawn_blocking`.

use crate::config::SplitConfig;
use crate::error::PageSplitError;
use crate::pipeline::geometry::TargetGeometry;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Environment variable naming an explicit pdfium library file.
pub const PDFIUM_LIB_ENV: &str = "PDFIUM_LIB_PATH";

/// Renders a single page of an in-memory PDF.
///
/// Implementations are called from blocking threads and must be
/// `Send + Sync`. The returned image may be any size; the pipeline crops or
/// pads it to the target geometry afterwards.
pub trait PageRenderer: Send + Sync {
    fn render_page(
        &self,
        document: &[u8],
        page_index: usize,
        geometry: &TargetGeometry,
    ) -> Result<DynamicImage, String>;
}

/// The default backend, using the pdfium C++ library.
#[derive(Debug)]
pub struct PdfiumRenderer {
    library_path: Option<PathBuf>,
    max_rendered_pixels: u32,
    lock: Mutex<()>,
}

impl PdfiumRenderer {
    pub fn new(library_path: Option<PathBuf>, max_rendered_pixels: u32) -> Self {
        Self {
            library_path,
            max_rendered_pixels: max_rendered_pixels.max(1),
            lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: &SplitConfig) -> Self {
        Self::new(config.pdfium_library_path.clone(), config.max_rendered_pixels)
    }

    /// Check that a pdfium library can be bound, without rendering anything.
    ///
    /// Useful at startup so a missing library fails fast instead of on the
    /// first raster.
    pub fn check_library(&self) -> Result<(), PageSplitError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| PageSplitError::Internal("pdfium render lock poisoned".into()))?;
        bind(self.library_path.as_deref())
            .map(drop)
            .map_err(PageSplitError::PdfiumBindingFailed)
    }
}

impl PageRenderer for PdfiumRenderer {
    fn render_page(
        &self,
        document: &[u8],
        page_index: usize,
        geometry: &TargetGeometry,
    ) -> Result<DynamicImage, String> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| "pdfium render lock poisoned".to_string())?;

        let pdfium = bind(self.library_path.as_deref())?;
        let doc = pdfium
            .load_pdf_from_byte_slice(document, None)
            .map_err(|e| format!("pdfium could not open document: {e:?}"))?;

        let index = PdfPageIndex::try_from(page_index)
            .map_err(|_| format!("page index {page_index} exceeds pdfium's page limit"))?;
        let page = doc
            .pages()
            .get(index)
            .map_err(|e| format!("pdfium could not load page: {e:?}"))?;

        let size = geometry.render_size(
            page.width().value,
            page.height().value,
            self.max_rendered_pixels,
        );
        let render_config = PdfRenderConfig::new()
            .set_target_size(size.width as i32, size.height as i32)
            .render_form_data(true);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| format!("pdfium render failed: {e:?}"))?;
        let image = bitmap.as_image();

        debug!(
            "Rendered page {} ({}x{} pt) → {}x{} px",
            page_index,
            page.width().value,
            page.height().value,
            image.width(),
            image.height()
        );
        Ok(image)
    }
}

/// Bind to pdfium, first match wins: explicit path, `PDFIUM_LIB_PATH`, the
/// working directory, then the system loader path.
fn bind(explicit: Option<&Path>) -> Result<Pdfium, String> {
    let mut attempts: Vec<String> = Vec::new();

    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(path) = explicit {
        candidates.push(path.to_path_buf());
    }
    if let Ok(env_path) = std::env::var(PDFIUM_LIB_ENV) {
        if !env_path.is_empty() {
            candidates.push(PathBuf::from(env_path));
        }
    }
    candidates.push(Pdfium::pdfium_platform_library_name_at_path("./"));

    for path in candidates {
        match Pdfium::bind_to_library(&path) {
            Ok(bindings) => {
                debug!("Bound pdfium from {}", path.display());
                return Ok(Pdfium::new(bindings));
            }
            Err(e) => attempts.push(format!("{}: {e}", path.display())),
        }
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(e) => {
            attempts.push(format!("system library: {e}"));
            Err(attempts.join("; "))
        }
    }
}
