//! Configuration types for PDF page splitting.
//!
//! Two kinds of configuration exist and they are kept apart on purpose:
//!
//! * [`ConversionParams`]: the per-invocation request (raster format and
//!   size). Built exactly once at the boundary from an [`InvocationEvent`] or
//!   from CLI flags; all defaulting happens in that construction step and
//!   nowhere downstream.
//! * [`SplitConfig`]: how the pipeline runs (concurrency, designated raster
//!   page, fit mode, timeouts). Built via [`SplitConfigBuilder`] and shared by
//!   every invocation a process serves.

use crate::error::PageSplitError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default raster width in pixels (A4 at 72 dpi).
pub const DEFAULT_WIDTH: u32 = 595;

/// Default raster height in pixels (A4 at 72 dpi).
pub const DEFAULT_HEIGHT: u32 = 842;

/// Largest accepted raster edge in pixels (the WebP format limit).
pub const MAX_DIMENSION: u32 = 16383;

// ── Raster format ────────────────────────────────────────────────────────

/// Supported raster encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RasterFormat {
    /// Lossless WebP. (default)
    #[default]
    Webp,
    /// Baseline JPEG.
    Jpeg,
    /// PNG.
    Png,
}

impl RasterFormat {
    /// File extension used in storage keys.
    pub fn extension(self) -> &'static str {
        match self {
            RasterFormat::Webp => "webp",
            RasterFormat::Jpeg => "jpeg",
            RasterFormat::Png => "png",
        }
    }

    /// MIME type declared on the stored object.
    pub fn content_type(self) -> &'static str {
        match self {
            RasterFormat::Webp => "image/webp",
            RasterFormat::Jpeg => "image/jpeg",
            RasterFormat::Png => "image/png",
        }
    }
}

impl fmt::Display for RasterFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for RasterFormat {
    type Err = PageSplitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Exact names only: the name becomes the key extension.
        match s {
            "webp" => Ok(RasterFormat::Webp),
            "jpeg" => Ok(RasterFormat::Jpeg),
            "png" => Ok(RasterFormat::Png),
            other => Err(PageSplitError::InvalidParams(format!(
                "unsupported raster format '{other}' (expected webp, jpeg or png)"
            ))),
        }
    }
}

// ── Fit mode ─────────────────────────────────────────────────────────────

/// How a rendered page is mapped onto the exact target box.
///
/// Both modes produce an image of exactly the requested size; they differ in
/// whether the excess is cropped or the shortfall padded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    /// Scale to cover the box, crop the overflow around the centre. (default)
    #[default]
    Cover,
    /// Scale to fit inside the box, pad the remainder with white around the
    /// centre (letterbox).
    Contain,
}

impl FromStr for FitMode {
    type Err = PageSplitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cover" | "crop" => Ok(FitMode::Cover),
            "contain" | "pad" | "letterbox" => Ok(FitMode::Contain),
            other => Err(PageSplitError::InvalidConfig(format!(
                "unknown fit mode '{other}' (expected cover or contain)"
            ))),
        }
    }
}

// ── Per-invocation parameters ────────────────────────────────────────────

/// Raster conversion request for one invocation.
///
/// Invariant: `0 < width, height <= MAX_DIMENSION`. The only constructors are
/// [`ConversionParams::new`], [`ConversionParams::from_event`] and `Default`,
/// all of which uphold it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConversionParams {
    format: RasterFormat,
    width: u32,
    height: u32,
}

impl Default for ConversionParams {
    fn default() -> Self {
        Self {
            format: RasterFormat::default(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }
}

impl ConversionParams {
    /// Validate explicit parameters.
    pub fn new(format: RasterFormat, width: u32, height: u32) -> Result<Self, PageSplitError> {
        if width == 0 || height == 0 {
            return Err(PageSplitError::InvalidParams(format!(
                "raster size must be positive, got {width}x{height}"
            )));
        }
        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(PageSplitError::InvalidParams(format!(
                "raster size {width}x{height} exceeds the {MAX_DIMENSION}px limit"
            )));
        }
        Ok(Self {
            format,
            width,
            height,
        })
    }

    /// Build parameters from a raw invocation event, applying defaults for
    /// absent fields.
    pub fn from_event(event: &InvocationEvent) -> Result<Self, PageSplitError> {
        let format = match event.format.as_deref() {
            None | Some("") => RasterFormat::default(),
            Some(f) => f.parse()?,
        };
        let width = parse_dimension("width", event.width.as_ref(), DEFAULT_WIDTH)?;
        let height = parse_dimension("height", event.height.as_ref(), DEFAULT_HEIGHT)?;
        Self::new(format, width, height)
    }

    pub fn format(&self) -> RasterFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

/// Interpret a loosely-typed dimension field.
///
/// Absent, `null`, `false`, empty strings and zero select the default; this
/// matches how legacy callers signal "not provided". Numbers may arrive as
/// JSON numbers or numeric strings.
fn parse_dimension(field: &str, value: Option<&Value>, default: u32) -> Result<u32, PageSplitError> {
    let invalid = |got: &dyn fmt::Display| {
        PageSplitError::InvalidParams(format!("{field} must be a positive integer, got {got}"))
    };

    let parsed: u64 = match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => return Ok(default),
        Some(Value::Number(n)) => {
            if let Some(v) = n.as_u64() {
                v
            } else {
                match n.as_f64() {
                    Some(f) if f >= 0.0 && f.fract() == 0.0 => f as u64,
                    _ => return Err(invalid(n)),
                }
            }
        }
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(default);
            }
            s.parse::<u64>().map_err(|_| invalid(&s))?
        }
        Some(other) => return Err(invalid(other)),
    };

    if parsed == 0 {
        return Ok(default);
    }
    u32::try_from(parsed).map_err(|_| invalid(&parsed))
}

/// The raw invocation payload, as delivered by the trigger.
///
/// ```json
/// { "bucket": "uploads", "pdfkey": "docs/my+report.pdf", "format": "webp", "width": 300 }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvocationEvent {
    /// Storage container holding the source and receiving the outputs.
    pub bucket: String,
    /// Source object key; percent-encoded with `+` meaning space.
    pub pdfkey: String,
    /// Raster format; defaults to `webp`.
    #[serde(default)]
    pub format: Option<String>,
    /// Raster width in pixels; defaults to 595.
    #[serde(default)]
    pub width: Option<Value>,
    /// Raster height in pixels; defaults to 842.
    #[serde(default)]
    pub height: Option<Value>,
}

// ── Pipeline configuration ───────────────────────────────────────────────

/// Configuration for the decomposition pipeline.
///
/// Built via [`SplitConfig::builder()`] or using [`SplitConfig::default()`].
///
/// # Example
/// ```rust
/// use pdf_pagesplit::{FitMode, SplitConfig};
///
/// let config = SplitConfig::builder()
///     .concurrency(4)
///     .fit(FitMode::Contain)
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 4);
/// ```
#[derive(Clone)]
pub struct SplitConfig {
    /// Maximum number of page tasks in flight at once. Default: 8.
    ///
    /// Each task holds one rendered or extracted page in memory and one
    /// storage connection while uploading. Lower this on small workers or
    /// when the storage backend throttles; raise it for large documents on
    /// machines with spare cores.
    pub concurrency: usize,

    /// Zero-based index of the page to rasterise. Default: 0 (first page).
    pub raster_page: usize,

    /// Fit strategy for the raster. Default: [`FitMode::Cover`].
    pub fit: FitMode,

    /// Cap on the longest edge of the intermediate page render. Default: 4000.
    ///
    /// Extreme page aspect ratios combined with the cover strategy could ask
    /// pdfium for a bitmap tens of thousands of pixels wide; past this cap the
    /// final resize upscales instead.
    pub max_rendered_pixels: u32,

    /// Wall-clock deadline for one invocation in seconds. Default: none.
    pub timeout_secs: Option<u64>,

    /// Explicit pdfium library location. Default: try `PDFIUM_LIB_PATH`,
    /// the working directory, then the system loader path.
    pub pdfium_library_path: Option<PathBuf>,

    /// Receives per-output progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            raster_page: 0,
            fit: FitMode::default(),
            max_rendered_pixels: 4000,
            timeout_secs: None,
            pdfium_library_path: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for SplitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SplitConfig")
            .field("concurrency", &self.concurrency)
            .field("raster_page", &self.raster_page)
            .field("fit", &self.fit)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("timeout_secs", &self.timeout_secs)
            .field("pdfium_library_path", &self.pdfium_library_path)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn SplitProgressCallback>"),
            )
            .finish()
    }
}

impl SplitConfig {
    /// Create a new builder for `SplitConfig`.
    pub fn builder() -> SplitConfigBuilder {
        SplitConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`SplitConfig`].
#[derive(Debug)]
pub struct SplitConfigBuilder {
    config: SplitConfig,
}

impl SplitConfigBuilder {
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn raster_page(mut self, index: usize) -> Self {
        self.config.raster_page = index;
        self
    }

    pub fn fit(mut self, fit: FitMode) -> Self {
        self.config.fit = fit;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = Some(secs);
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(path.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<SplitConfig, PageSplitError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(PageSplitError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.timeout_secs == Some(0) {
            return Err(PageSplitError::InvalidConfig(
                "Timeout must be at least one second".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(value: Value) -> InvocationEvent {
        serde_json::from_value(value).expect("valid event")
    }

    #[test]
    fn defaults_apply_when_fields_absent() {
        let params = ConversionParams::from_event(&event(json!({
            "bucket": "b",
            "pdfkey": "k.pdf"
        })))
        .unwrap();
        assert_eq!(params, ConversionParams::default());
        assert_eq!(params.format(), RasterFormat::Webp);
        assert_eq!((params.width(), params.height()), (595, 842));
    }

    #[test]
    fn numeric_strings_and_numbers_are_accepted() {
        let params = ConversionParams::from_event(&event(json!({
            "bucket": "b",
            "pdfkey": "k.pdf",
            "format": "png",
            "width": "300",
            "height": 400
        })))
        .unwrap();
        assert_eq!(params.format(), RasterFormat::Png);
        assert_eq!((params.width(), params.height()), (300, 400));
    }

    #[test]
    fn falsy_dimensions_fall_back_to_defaults() {
        let params = ConversionParams::from_event(&event(json!({
            "bucket": "b",
            "pdfkey": "k.pdf",
            "format": "",
            "width": 0,
            "height": null
        })))
        .unwrap();
        assert_eq!(params, ConversionParams::default());
    }

    #[test]
    fn negative_and_garbage_dimensions_are_rejected() {
        for bad in [json!(-5), json!("wide"), json!(12.5), json!([1])] {
            let err = ConversionParams::from_event(&event(json!({
                "bucket": "b",
                "pdfkey": "k.pdf",
                "width": bad
            })))
            .unwrap_err();
            assert!(matches!(err, PageSplitError::InvalidParams(_)), "got {err:?}");
        }
    }

    #[test]
    fn unknown_format_is_rejected() {
        let err = ConversionParams::from_event(&event(json!({
            "bucket": "b",
            "pdfkey": "k.pdf",
            "format": "tiff"
        })))
        .unwrap_err();
        assert!(err.to_string().contains("tiff"));
    }

    #[test]
    fn only_canonical_format_names_parse() {
        for format in [RasterFormat::Webp, RasterFormat::Jpeg, RasterFormat::Png] {
            assert_eq!(format.extension().parse::<RasterFormat>().unwrap(), format);
            assert_eq!(format.content_type(), format!("image/{}", format.extension()));
        }
        for spelling in ["jpg", "PNG", "Webp", " png", "jpeg "] {
            assert!(
                matches!(
                    spelling.parse::<RasterFormat>(),
                    Err(PageSplitError::InvalidParams(_))
                ),
                "{spelling:?} should be rejected"
            );
        }
    }

    #[test]
    fn size_is_capped_at_max_dimension() {
        assert!(ConversionParams::new(RasterFormat::Webp, MAX_DIMENSION, MAX_DIMENSION).is_ok());
        assert!(matches!(
            ConversionParams::new(RasterFormat::Webp, MAX_DIMENSION + 1, 10),
            Err(PageSplitError::InvalidParams(_))
        ));
        assert!(matches!(
            ConversionParams::new(RasterFormat::Png, 10, MAX_DIMENSION + 1),
            Err(PageSplitError::InvalidParams(_))
        ));

        let err = ConversionParams::from_event(&event(json!({
            "bucket": "b",
            "pdfkey": "k.pdf",
            "width": 100000,
            "height": 100000
        })))
        .unwrap_err();
        assert!(matches!(err, PageSplitError::InvalidParams(_)), "got {err:?}");
    }

    #[test]
    fn explicit_zero_size_is_rejected() {
        assert!(ConversionParams::new(RasterFormat::Png, 0, 10).is_err());
        assert!(ConversionParams::new(RasterFormat::Png, 10, 0).is_err());
    }

    #[test]
    fn builder_clamps_and_validates() {
        let config = SplitConfig::builder()
            .concurrency(0)
            .max_rendered_pixels(10)
            .build()
            .unwrap();
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.max_rendered_pixels, 100);

        let err = SplitConfig::builder().timeout_secs(0).build().unwrap_err();
        assert!(matches!(err, PageSplitError::InvalidConfig(_)));
    }

    #[test]
    fn fit_mode_parses_aliases() {
        assert_eq!("crop".parse::<FitMode>().unwrap(), FitMode::Cover);
        assert_eq!("Letterbox".parse::<FitMode>().unwrap(), FitMode::Contain);
        assert!("stretch".parse::<FitMode>().is_err());
    }
}
