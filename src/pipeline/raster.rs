//! Rasterisation: render one page, fit it to the exact target box and encode.
//!
//! ## Why an event stream?
//!
//! Encoding happens on a blocking thread while the async side waits. Instead
//! of handing back a buffer plus a separate status flag, the encoder writes
//! through a bounded channel of [`RenderEvent`]s. Every stream ends in exactly
//! one terminal event and the outcome is read from that event alone:
//!
//! ```text
//! Data(chunk)* End           → Ok(bytes)
//! Data(chunk)* Error(detail) → RasterizationFailed
//! Data(chunk)* <closed>      → RasterizationFailed ("closed before completion")
//! ```
//!
//! The channel is bounded, so a slow consumer applies backpressure to the
//! encoder rather than letting chunks pile up.

use crate::config::{FitMode, RasterFormat};
use crate::error::OutputError;
use crate::pipeline::geometry::TargetGeometry;
use crate::pipeline::render::PageRenderer;
use crate::pipeline::source::SourceDocument;
use futures::{Stream, StreamExt};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::{self, FilterType};
use image::{
    DynamicImage, ExtendedColorType, ImageEncoder, ImageError, Rgb, RgbImage, Rgba, RgbaImage,
};
use std::io::{self, Write};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

/// Size of each `Data` chunk sent over the channel.
const CHUNK_SIZE: usize = 64 * 1024;

/// Chunks buffered between encoder and consumer.
const EVENT_CHANNEL_CAPACITY: usize = 8;

const JPEG_QUALITY: u8 = 90;

const PAD_COLOUR: Rgb<u8> = Rgb([255, 255, 255]);

/// One event of an encoded-raster stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderEvent {
    /// A chunk of encoded output, in order.
    Data(Vec<u8>),
    /// Terminal: encoding failed.
    Error(String),
    /// Terminal: encoding finished; all data has been sent.
    End,
}

/// An encoded raster of exactly the requested size.
#[derive(Debug, Clone)]
pub struct RasterImage {
    pub bytes: Vec<u8>,
    pub format: RasterFormat,
    pub width: u32,
    pub height: u32,
}

impl RasterImage {
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }
}

/// Render page `page_index` of `source` and encode it to `format` at exactly
/// `geometry.width x geometry.height`.
///
/// The index is checked before the renderer is touched.
pub async fn rasterize(
    renderer: Arc<dyn PageRenderer>,
    source: Arc<SourceDocument>,
    page_index: usize,
    geometry: TargetGeometry,
    format: RasterFormat,
) -> Result<RasterImage, OutputError> {
    source.ensure_page(page_index)?;

    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let producer = tokio::task::spawn_blocking(move || {
        let outcome = render_and_encode(
            renderer.as_ref(),
            source.bytes(),
            page_index,
            &geometry,
            format,
            &tx,
        );
        let terminal = match outcome {
            Ok(()) => RenderEvent::End,
            Err(detail) => RenderEvent::Error(detail),
        };
        // A closed receiver means the consumer is gone; nothing to report to.
        let _ = tx.blocking_send(terminal);
    });

    let collected = collect_render_stream(ReceiverStream::new(rx)).await;

    if let Err(e) = producer.await {
        return Err(OutputError::RasterizationFailed {
            page: page_index,
            detail: format!("render task panicked: {e}"),
        });
    }

    let bytes = collected.map_err(|detail| OutputError::RasterizationFailed {
        page: page_index,
        detail,
    })?;

    debug!(
        "Page {} rasterised to {}x{} {} ({} bytes)",
        page_index,
        geometry.width,
        geometry.height,
        format,
        bytes.len()
    );

    Ok(RasterImage {
        bytes,
        format,
        width: geometry.width,
        height: geometry.height,
    })
}

/// Drain a render stream into one buffer, deciding the outcome from the
/// terminal event.
pub async fn collect_render_stream<S>(mut events: S) -> Result<Vec<u8>, String>
where
    S: Stream<Item = RenderEvent> + Unpin,
{
    let mut buf = Vec::new();
    while let Some(event) = events.next().await {
        match event {
            RenderEvent::Data(chunk) => buf.extend_from_slice(&chunk),
            RenderEvent::Error(detail) => return Err(detail),
            RenderEvent::End => return Ok(buf),
        }
    }
    Err("render stream closed before completion".to_string())
}

fn render_and_encode(
    renderer: &dyn PageRenderer,
    document: &[u8],
    page_index: usize,
    geometry: &TargetGeometry,
    format: RasterFormat,
    tx: &mpsc::Sender<RenderEvent>,
) -> Result<(), String> {
    let rendered = renderer.render_page(document, page_index, geometry)?;
    let fitted = fit_to_target(&rendered, geometry);

    let mut writer = ChunkWriter::new(tx);
    encode(&fitted, format, &mut writer).map_err(|e| format!("{format} encoding failed: {e}"))?;
    writer
        .finish()
        .map_err(|e| format!("render stream interrupted: {e}"))
}

/// Scale, then crop or pad around the centre so the result is exactly
/// `geometry.width x geometry.height`.
pub fn fit_to_target(image: &DynamicImage, geometry: &TargetGeometry) -> RgbImage {
    let (w, h) = (geometry.width, geometry.height);
    let flat = flatten(image);

    if flat.width() == w && flat.height() == h {
        return flat.into_rgb8();
    }

    match geometry.fit {
        FitMode::Cover => flat.resize_to_fill(w, h, FilterType::Lanczos3).into_rgb8(),
        FitMode::Contain => {
            let scaled = flat.resize(w, h, FilterType::Lanczos3).into_rgb8();
            let mut canvas = RgbImage::from_pixel(w, h, PAD_COLOUR);
            let x = (w.saturating_sub(scaled.width()) / 2) as i64;
            let y = (h.saturating_sub(scaled.height()) / 2) as i64;
            imageops::overlay(&mut canvas, &scaled, x, y);
            canvas
        }
    }
}

/// Composite any transparency onto white so no format turns it black.
fn flatten(image: &DynamicImage) -> DynamicImage {
    if !image.color().has_alpha() {
        return image.clone();
    }
    let (w, h) = (image.width(), image.height());
    let mut canvas = RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255]));
    imageops::overlay(&mut canvas, &image.to_rgba8(), 0, 0);
    DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(canvas).into_rgb8())
}

/// Encode an RGB image to `format`, writing to `out`.
pub fn encode<W: Write>(image: &RgbImage, format: RasterFormat, out: W) -> Result<(), ImageError> {
    let (w, h) = image.dimensions();
    match format {
        RasterFormat::Webp => {
            WebPEncoder::new_lossless(out).write_image(image.as_raw(), w, h, ExtendedColorType::Rgb8)
        }
        RasterFormat::Jpeg => JpegEncoder::new_with_quality(out, JPEG_QUALITY)
            .write_image(image.as_raw(), w, h, ExtendedColorType::Rgb8),
        RasterFormat::Png => {
            PngEncoder::new(out).write_image(image.as_raw(), w, h, ExtendedColorType::Rgb8)
        }
    }
}

/// `io::Write` adapter that forwards fixed-size chunks as
/// [`RenderEvent::Data`].
///
/// Must be used from a blocking thread: sends block when the channel is full.
pub struct ChunkWriter<'a> {
    tx: &'a mpsc::Sender<RenderEvent>,
    buf: Vec<u8>,
}

impl<'a> ChunkWriter<'a> {
    pub fn new(tx: &'a mpsc::Sender<RenderEvent>) -> Self {
        Self {
            tx,
            buf: Vec::with_capacity(CHUNK_SIZE),
        }
    }

    /// Send whatever is still buffered. Does not send the terminal event.
    pub fn finish(mut self) -> io::Result<()> {
        self.send_buffered()
    }

    fn send_buffered(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::replace(&mut self.buf, Vec::with_capacity(CHUNK_SIZE));
        self.tx
            .blocking_send(RenderEvent::Data(chunk))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "render stream receiver dropped"))
    }
}

impl Write for ChunkWriter<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let room = CHUNK_SIZE - self.buf.len();
        let n = data.len().min(room);
        self.buf.extend_from_slice(&data[..n]);
        if self.buf.len() == CHUNK_SIZE {
            self.send_buffered()?;
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_buffered()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::geometry::{resolve, resolve_with_fit};
    use crate::pipeline::testing::sample_pdf;
    use image::GenericImageView;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Renders a flat grey bitmap of a fixed size, counting calls.
    struct GreyRenderer {
        calls: AtomicUsize,
        size: (u32, u32),
    }

    impl GreyRenderer {
        fn new(size: (u32, u32)) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                size,
            }
        }
    }

    impl PageRenderer for GreyRenderer {
        fn render_page(&self, _: &[u8], _: usize, _: &TargetGeometry) -> Result<DynamicImage, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(
                self.size.0,
                self.size.1,
                Rgb([128, 128, 128]),
            )))
        }
    }

    struct BrokenRenderer;

    impl PageRenderer for BrokenRenderer {
        fn render_page(&self, _: &[u8], _: usize, _: &TargetGeometry) -> Result<DynamicImage, String> {
            Err("no glyphs today".into())
        }
    }

    struct PanickingRenderer;

    impl PageRenderer for PanickingRenderer {
        fn render_page(&self, _: &[u8], _: usize, _: &TargetGeometry) -> Result<DynamicImage, String> {
            panic!("renderer exploded")
        }
    }

    fn source(pages: usize) -> Arc<SourceDocument> {
        let sizes = vec![(612.0, 792.0); pages];
        Arc::new(SourceDocument::load(sample_pdf(&sizes)).unwrap())
    }

    #[test]
    fn cover_fit_hits_exact_size_for_any_aspect() {
        for (src_w, src_h) in [(1000, 200), (200, 1000), (300, 400), (7, 9)] {
            let img = DynamicImage::ImageRgb8(RgbImage::new(src_w, src_h));
            let out = fit_to_target(&img, &resolve(300, 400));
            assert_eq!(out.dimensions(), (300, 400), "source {src_w}x{src_h}");
        }
    }

    #[test]
    fn contain_fit_pads_with_white() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(100, 100, Rgb([0, 0, 0])));
        let out = fit_to_target(&img, &resolve_with_fit(200, 100, FitMode::Contain));
        assert_eq!(out.dimensions(), (200, 100));
        assert_eq!(*out.get_pixel(0, 50), PAD_COLOUR);
        assert_eq!(*out.get_pixel(199, 50), PAD_COLOUR);
        assert_eq!(*out.get_pixel(100, 50), Rgb([0, 0, 0]));
    }

    #[test]
    fn transparency_flattens_to_white() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 0])));
        let out = fit_to_target(&img, &resolve(10, 10));
        assert_eq!(*out.get_pixel(5, 5), Rgb([255, 255, 255]));
    }

    #[test]
    fn half_transparent_black_becomes_mid_grey() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 128])));
        let out = fit_to_target(&img, &resolve(4, 4));
        let Rgb([r, g, b]) = *out.get_pixel(1, 1);
        assert!((120..=135).contains(&r), "{r}");
        assert_eq!((r, r), (g, b));
    }

    #[test]
    fn every_format_decodes_at_requested_size() {
        let img = RgbImage::from_pixel(31, 17, Rgb([10, 200, 30]));
        for format in [RasterFormat::Webp, RasterFormat::Jpeg, RasterFormat::Png] {
            let mut out = Vec::new();
            encode(&img, format, &mut out).unwrap();
            let decoded = image::load_from_memory(&out).unwrap();
            assert_eq!(decoded.dimensions(), (31, 17), "{format}");
        }
    }

    #[tokio::test]
    async fn stream_ending_in_end_yields_all_data() {
        let events = futures::stream::iter(vec![
            RenderEvent::Data(b"ab".to_vec()),
            RenderEvent::Data(b"cd".to_vec()),
            RenderEvent::End,
        ]);
        assert_eq!(collect_render_stream(events).await.unwrap(), b"abcd");
    }

    #[tokio::test]
    async fn stream_ending_in_error_fails() {
        let events = futures::stream::iter(vec![
            RenderEvent::Data(b"ab".to_vec()),
            RenderEvent::Error("disk full".into()),
        ]);
        assert_eq!(collect_render_stream(events).await.unwrap_err(), "disk full");
    }

    #[tokio::test]
    async fn stream_closed_without_terminal_fails() {
        let events = futures::stream::iter(vec![RenderEvent::Data(b"ab".to_vec())]);
        let err = collect_render_stream(events).await.unwrap_err();
        assert!(err.contains("closed before completion"), "{err}");
    }

    #[tokio::test]
    async fn chunk_writer_splits_large_output() {
        let (tx, rx) = mpsc::channel(4);
        let producer = tokio::task::spawn_blocking(move || {
            let mut writer = ChunkWriter::new(&tx);
            writer.write_all(&vec![7u8; CHUNK_SIZE * 2 + 10]).unwrap();
            writer.finish().unwrap();
            tx.blocking_send(RenderEvent::End).unwrap();
        });
        let mut rx = ReceiverStream::new(rx);
        let mut sizes = Vec::new();
        while let Some(event) = rx.next().await {
            match event {
                RenderEvent::Data(chunk) => sizes.push(chunk.len()),
                other => {
                    assert_eq!(other, RenderEvent::End);
                    break;
                }
            }
        }
        producer.await.unwrap();
        assert_eq!(sizes, vec![CHUNK_SIZE, CHUNK_SIZE, 10]);
    }

    #[tokio::test]
    async fn rasterize_produces_exact_dimensions() {
        let renderer = Arc::new(GreyRenderer::new((612, 792)));
        let raster = rasterize(renderer.clone(), source(2), 1, resolve(300, 400), RasterFormat::Png)
            .await
            .unwrap();
        assert_eq!(raster.content_type(), "image/png");
        let decoded = image::load_from_memory(&raster.bytes).unwrap();
        assert_eq!(decoded.dimensions(), (300, 400));
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn out_of_range_page_never_reaches_renderer() {
        let renderer = Arc::new(GreyRenderer::new((10, 10)));
        let err = rasterize(renderer.clone(), source(2), 2, resolve(10, 10), RasterFormat::Webp)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            OutputError::InvalidPageIndex {
                index: 2,
                page_count: 2
            }
        );
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn renderer_error_is_rasterization_failure() {
        let err = rasterize(Arc::new(BrokenRenderer), source(1), 0, resolve(10, 10), RasterFormat::Jpeg)
            .await
            .unwrap_err();
        match err {
            OutputError::RasterizationFailed { page, detail } => {
                assert_eq!(page, 0);
                assert!(detail.contains("no glyphs"), "{detail}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn renderer_panic_is_rasterization_failure() {
        let err = rasterize(Arc::new(PanickingRenderer), source(1), 0, resolve(10, 10), RasterFormat::Png)
            .await
            .unwrap_err();
        assert!(matches!(err, OutputError::RasterizationFailed { page: 0, .. }), "{err:?}");
    }
}
