//! Target geometry: requested raster size and the fit strategy used to hit it.
//!
//! The output raster must be exactly `width x height` regardless of the
//! page's own aspect ratio. Pages are rendered at a resolution just large
//! enough for the chosen [`FitMode`] and the rendered bitmap is then cropped
//! or padded around its centre by [`crate::pipeline::raster`].

use crate::config::FitMode;
use serde::Serialize;

/// Exact raster dimensions plus the strategy used to reach them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TargetGeometry {
    pub width: u32,
    pub height: u32,
    pub fit: FitMode,
}

/// Pixel size at which a page should be rendered before fitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

/// Resolve the target geometry with the default cover strategy.
///
/// Callers apply defaults (595x842) before calling; inputs are expected to be
/// positive.
pub fn resolve(width: u32, height: u32) -> TargetGeometry {
    resolve_with_fit(width, height, FitMode::Cover)
}

/// Resolve the target geometry with an explicit fit strategy.
pub fn resolve_with_fit(width: u32, height: u32, fit: FitMode) -> TargetGeometry {
    TargetGeometry {
        width: width.max(1),
        height: height.max(1),
        fit,
    }
}

impl TargetGeometry {
    /// Compute the render size for a page of `page_width x page_height`
    /// points.
    ///
    /// For [`FitMode::Cover`] the render covers the target box on both axes;
    /// for [`FitMode::Contain`] it fits inside on both axes. The longest edge
    /// is capped at `max_pixels`, in which case the fitting step upscales.
    pub fn render_size(&self, page_width: f32, page_height: f32, max_pixels: u32) -> RenderSize {
        if !(page_width > 0.0 && page_height > 0.0) {
            return RenderSize {
                width: self.width,
                height: self.height,
            };
        }

        let sx = self.width as f64 / page_width as f64;
        let sy = self.height as f64 / page_height as f64;
        let scale = match self.fit {
            FitMode::Cover => sx.max(sy),
            FitMode::Contain => sx.min(sy),
        };

        // Trim float noise so an exact fit does not round up a pixel.
        let mut w = (page_width as f64 * scale - 1e-6).ceil();
        let mut h = (page_height as f64 * scale - 1e-6).ceil();

        let longest = w.max(h);
        let cap = max_pixels.max(1) as f64;
        if longest > cap {
            let shrink = cap / longest;
            w = (w * shrink).floor();
            h = (h * shrink).floor();
        }

        RenderSize {
            width: (w as u32).max(1),
            height: (h as u32).max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_defaults_to_cover() {
        let g = resolve(300, 400);
        assert_eq!(g.width, 300);
        assert_eq!(g.height, 400);
        assert_eq!(g.fit, FitMode::Cover);
    }

    #[test]
    fn cover_render_spans_both_axes() {
        // A4 portrait into a landscape box: width is the binding axis.
        let g = resolve(400, 100);
        let size = g.render_size(595.0, 842.0, 10_000);
        assert!(size.width >= 400, "{size:?}");
        assert!(size.height >= 100, "{size:?}");
        assert_eq!(size.width, 400);
    }

    #[test]
    fn contain_render_fits_inside() {
        let g = resolve_with_fit(400, 100, FitMode::Contain);
        let size = g.render_size(595.0, 842.0, 10_000);
        assert!(size.width <= 400, "{size:?}");
        assert!(size.height <= 100, "{size:?}");
        assert_eq!(size.height, 100);
    }

    #[test]
    fn render_is_capped_at_max_pixels() {
        // A very tall, thin page in cover mode would need a huge render.
        let g = resolve(300, 400);
        let size = g.render_size(10.0, 2000.0, 1000);
        assert!(size.width.max(size.height) <= 1000, "{size:?}");
        assert!(size.width >= 1);
    }

    #[test]
    fn degenerate_page_falls_back_to_target() {
        let g = resolve(300, 400);
        assert_eq!(
            g.render_size(0.0, 842.0, 4000),
            RenderSize {
                width: 300,
                height: 400
            }
        );
        assert_eq!(g.render_size(f32::NAN, 10.0, 4000).width, 300);
    }

    #[test]
    fn matching_aspect_renders_at_target_size() {
        let g = resolve(595, 842);
        let size = g.render_size(595.0, 842.0, 4000);
        assert_eq!(
            size,
            RenderSize {
                width: 595,
                height: 842
            }
        );
    }
}
