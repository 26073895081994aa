//! Pipeline stages for PDF page splitting.
//!
//! Each submodule implements exactly one step. Keeping stages separate makes
//! each independently testable and lets us swap implementations (e.g. a
//! different render backend) without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//!            ┌─▶ render ──▶ raster ──▶ (image/{ext})
//! source ────┤  (pdfium)   (fit + encode)
//! (lopdf)    └─▶ extract ─────────────▶ (application/pdf) x N
//!                  (one-page copy)
//! ```
//!
//! 1. [`source`]:   validate the header and parse the page tree once
//! 2. [`geometry`]: exact target size and the pixel size to render at
//! 3. [`render`]:   the [`render::PageRenderer`] seam; pdfium by default.
//!    Runs in `spawn_blocking` because pdfium is not async-safe
//! 4. [`raster`]:   crop/pad to the exact box and encode, streamed as
//!    [`raster::RenderEvent`]s with a terminal signal
//! 5. [`extract`]:  copy one page and its dependencies into a new PDF
//! 6. [`naming`]:   storage keys derived from the source key

pub mod extract;
pub mod geometry;
pub mod naming;
pub mod raster;
pub mod render;
pub mod source;

#[cfg(test)]
pub(crate) mod testing;
