//! Lazy animated-frame decoding.
//!
//! Container metadata (size, frame count, timing, loop flag) is parsed once at
//! construction by walking the container structure. Pixels are produced on
//! demand into a caller-owned [`FrameBuffer`], through a [`FrameWindow`] of
//! composited frames ahead of the playback position.

mod gif;
mod webp;

use std::borrow::Cow;

use bytes::Bytes;
use image::imageops::FilterType;
use image::{Frame, Frames, ImageResult, RgbaImage};
use tracing::{debug, trace};

use crate::domain::entities::{AnimatedFormat, AnimatedImage, FrameBuffer};
use crate::domain::errors::DecoderError;

pub use gif::GifDecoder;
pub use webp::WebPDecoder;

/// Frame duration used when the container reports no timing.
pub const DEFAULT_FRAME_DURATION_MS: u64 = 100;

/// Budget for composited frames held by one decoder.
pub const FRAME_WINDOW_BYTES: usize = 16 * 1024 * 1024;

/// Decoder for one animated container.
///
/// An instance is single-owner: `decode_frame` takes `&mut self` and must not
/// be shared between playback tasks.
pub trait AnimatedDecoder: Send {
    /// Container format.
    fn format(&self) -> AnimatedFormat;

    /// Intrinsic canvas width.
    fn width(&self) -> u32;

    /// Intrinsic canvas height.
    fn height(&self) -> u32;

    /// Number of frames, exact or estimated. Always at least 1.
    fn frame_count(&self) -> u32;

    /// Total animation duration in milliseconds.
    fn duration(&self) -> u64;

    /// Whether playback wraps around after the last frame.
    fn is_looping(&self) -> bool;

    /// Display duration of `index` in milliseconds, without decoding.
    /// This is the average frame duration, not a per-frame value.
    fn frame_duration(&self, index: u32) -> u64;

    /// Decodes frame `index` into `output` and returns its display duration.
    ///
    /// # Errors
    /// Returns `DecoderError::Released` after [`AnimatedDecoder::release`], or a
    /// frame error if the container cannot produce pixels.
    fn decode_frame(&mut self, index: u32, output: &mut FrameBuffer) -> Result<u64, DecoderError>;

    /// Frees decoder resources. Idempotent.
    fn release(&mut self);

    /// Returns true once released.
    fn is_released(&self) -> bool;
}

/// Metadata parsed from a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ContainerInfo {
    pub width: u32,
    pub height: u32,
    pub frame_count: u32,
    pub duration_ms: u64,
    pub looping: bool,
}

impl ContainerInfo {
    /// Average frame duration.
    pub fn average_frame_duration(&self) -> u64 {
        if self.duration_ms > 0 && self.frame_count > 0 {
            self.duration_ms / u64::from(self.frame_count)
        } else {
            DEFAULT_FRAME_DURATION_MS
        }
    }

    /// Maps a requested index onto a real frame, modulo the frame count.
    pub fn frame_index(&self, index: u32) -> u32 {
        index % self.frame_count.max(1)
    }
}

/// Resolves which decoder implementation serves each format.
///
/// Capability detection happens once, when the factory is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimatedDecoderFactory {
    animated_webp: bool,
}

impl AnimatedDecoderFactory {
    /// Detects platform capabilities from the compiled feature set.
    #[must_use]
    pub const fn detect() -> Self {
        Self {
            animated_webp: cfg!(feature = "animated-webp"),
        }
    }

    /// Overrides animated WebP support. Enabling has no effect when the
    /// capability was not compiled in.
    #[must_use]
    pub const fn with_animated_webp(mut self, enabled: bool) -> Self {
        self.animated_webp = enabled && cfg!(feature = "animated-webp");
        self
    }

    /// Returns true if `format` can be decoded here.
    #[must_use]
    pub const fn supports(&self, format: AnimatedFormat) -> bool {
        match format {
            AnimatedFormat::Gif => true,
            AnimatedFormat::WebP => self.animated_webp,
        }
    }

    /// Builds a decoder for `bytes`.
    ///
    /// # Errors
    /// Returns `DecoderError::Unsupported` immediately if the format cannot be
    /// decoded on this platform, or `DecoderError::Malformed` if the container
    /// cannot be parsed.
    pub fn create(
        &self,
        bytes: Bytes,
        format: AnimatedFormat,
    ) -> Result<Box<dyn AnimatedDecoder>, DecoderError> {
        if !self.supports(format) {
            return Err(DecoderError::unsupported(format));
        }

        match format {
            AnimatedFormat::Gif => Ok(Box::new(GifDecoder::new(bytes)?)),
            AnimatedFormat::WebP => Ok(Box::new(WebPDecoder::new(bytes)?)),
        }
    }

    /// Extracts asset metadata once, then releases the decoder.
    ///
    /// # Errors
    /// Same as [`AnimatedDecoderFactory::create`].
    pub fn probe(&self, bytes: Bytes, format: AnimatedFormat) -> Result<AnimatedImage, DecoderError> {
        let mut decoder = self.create(bytes.clone(), format)?;
        let asset = AnimatedImage {
            bytes,
            format,
            frame_count: decoder.frame_count(),
            width: decoder.width(),
            height: decoder.height(),
        };
        decoder.release();
        debug!(
            format = %format,
            frames = asset.frame_count,
            width = asset.width,
            height = asset.height,
            "Probed animated container"
        );
        Ok(asset)
    }

    /// Builds a playback decoder for an ingested asset.
    ///
    /// # Errors
    /// Same as [`AnimatedDecoderFactory::create`].
    pub fn open(&self, asset: &AnimatedImage) -> Result<Box<dyn AnimatedDecoder>, DecoderError> {
        self.create(asset.bytes.clone(), asset.format)
    }
}

impl Default for AnimatedDecoderFactory {
    fn default() -> Self {
        Self::detect()
    }
}

/// Consecutive composited frames kept by a decoder.
///
/// Compositing frame `n` needs every frame before it, so a miss reopens the
/// container and decodes forward from the start. Frames from `n` on are then
/// kept up to [`FRAME_WINDOW_BYTES`], so sequential playback only reopens when
/// it leaves the window. Animations that fit the budget are decoded once.
#[derive(Debug)]
pub(crate) struct FrameWindow {
    start: u32,
    frames: Vec<RgbaImage>,
    limit: usize,
    reopens: u64,
}

impl FrameWindow {
    /// Sizes the window for frames of the given canvas.
    pub fn new(width: u32, height: u32) -> Self {
        let frame_bytes = (width as usize)
            .saturating_mul(height as usize)
            .saturating_mul(4)
            .max(1);
        Self {
            start: 0,
            frames: Vec::new(),
            limit: (FRAME_WINDOW_BYTES / frame_bytes).max(1),
            reopens: 0,
        }
    }

    fn offset(&self, index: u32) -> Option<usize> {
        let offset = index.checked_sub(self.start)? as usize;
        (offset < self.frames.len()).then_some(offset)
    }

    /// Returns composited frame `index`, refilling the window on a miss.
    /// When the container holds fewer frames than estimated, the first frame
    /// is returned instead.
    pub fn frame<F>(&mut self, index: u32, open: F) -> Result<&RgbaImage, DecoderError>
    where
        F: Fn() -> Result<Frames<'static>, DecoderError>,
    {
        if self.offset(index).is_none() {
            self.fill(index, &open)?;
        }
        let offset = self.offset(index).unwrap_or_default();
        self.frames
            .get(offset)
            .ok_or_else(|| DecoderError::frame(index, "container holds no frames"))
    }

    fn fill<F>(&mut self, index: u32, open: &F) -> Result<(), DecoderError>
    where
        F: Fn() -> Result<Frames<'static>, DecoderError>,
    {
        self.frames.clear();
        self.reopens += 1;
        trace!(index, reopens = self.reopens, "Refilling frame window");

        let mut frames = collect_frames(open()?.skip(index as usize), self.limit, index)?;
        self.start = index;
        if frames.is_empty() {
            frames = collect_frames(open()?, self.limit, index)?;
            self.start = 0;
        }
        self.frames = frames;
        Ok(())
    }

    /// Drops every held frame.
    pub fn clear(&mut self) {
        self.frames = Vec::new();
    }
}

/// Takes up to `limit` frames. An error on the first frame fails the call;
/// a later one only shortens the result.
fn collect_frames<I>(frames: I, limit: usize, index: u32) -> Result<Vec<RgbaImage>, DecoderError>
where
    I: Iterator<Item = ImageResult<Frame>>,
{
    let mut out = Vec::new();
    for frame in frames.take(limit) {
        match frame {
            Ok(frame) => out.push(frame.into_buffer()),
            Err(e) if out.is_empty() => return Err(DecoderError::frame(index, e.to_string())),
            Err(e) => {
                debug!(index, error = %e, "Frame window cut short");
                break;
            }
        }
    }
    Ok(out)
}

/// Draws `frame` into `output`: clears it, then scales to fit (aspect
/// preserved, centered, never cropped) when the sizes differ.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub(crate) fn draw_scaled(frame: &RgbaImage, output: &mut FrameBuffer) {
    output.clear();

    let (src_w, src_h) = frame.dimensions();
    let (dst_w, dst_h) = (output.width(), output.height());
    if src_w == 0 || src_h == 0 || dst_w == 0 || dst_h == 0 {
        return;
    }

    let scale = (dst_w as f32 / src_w as f32).min(dst_h as f32 / src_h as f32);
    let target_w = ((src_w as f32 * scale).round() as u32).clamp(1, dst_w);
    let target_h = ((src_h as f32 * scale).round() as u32).clamp(1, dst_h);

    let scaled: Cow<'_, RgbaImage> = if (target_w, target_h) == (src_w, src_h) {
        Cow::Borrowed(frame)
    } else {
        Cow::Owned(image::imageops::resize(
            frame,
            target_w,
            target_h,
            FilterType::Triangle,
        ))
    };

    let offset_x = (dst_w - target_w) / 2;
    let offset_y = (dst_h - target_h) / 2;
    for (x, y, pixel) in scaled.enumerate_pixels() {
        output.put_rgba(offset_x + x, offset_y + y, pixel.0);
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::PixelFormat;
    use image::Rgba;

    #[test]
    fn test_frame_index_wraps_when_looping() {
        let info = ContainerInfo {
            width: 1,
            height: 1,
            frame_count: 4,
            duration_ms: 400,
            looping: true,
        };
        assert_eq!(info.frame_index(0), 0);
        assert_eq!(info.frame_index(5), 1);
        assert_eq!(info.frame_index(8), 0);
        assert_eq!(info.average_frame_duration(), 100);
    }

    #[test]
    fn test_frame_index_wraps_without_looping_flag() {
        let info = ContainerInfo {
            width: 1,
            height: 1,
            frame_count: 3,
            duration_ms: 0,
            looping: false,
        };
        assert_eq!(info.frame_index(3), 0);
        assert_eq!(info.frame_index(7), 1);
        assert_eq!(info.average_frame_duration(), DEFAULT_FRAME_DURATION_MS);
    }

    fn open_gif(bytes: &Bytes) -> Result<Frames<'static>, DecoderError> {
        let decoder = image::codecs::gif::GifDecoder::new(std::io::Cursor::new(bytes.clone()))
            .map_err(|e| DecoderError::malformed(AnimatedFormat::Gif, e.to_string()))?;
        Ok(image::AnimationDecoder::into_frames(decoder))
    }

    #[test]
    fn test_frame_window_reopens_only_on_backward_jump() {
        let colors = [[255, 0, 0, 255], [0, 255, 0, 255], [0, 0, 255, 255]];
        let bytes = Bytes::from(fixtures::gif(2, 2, &colors, 10));
        let mut window = FrameWindow::new(2, 2);

        for (index, color) in colors.iter().enumerate() {
            let frame = window.frame(index as u32, || open_gif(&bytes)).unwrap();
            assert_eq!(frame.get_pixel(0, 0).0, *color);
        }
        assert_eq!(window.reopens, 1);

        window.frame(0, || open_gif(&bytes)).unwrap();
        assert_eq!(window.reopens, 1);

        window.clear();
        window.frame(2, || open_gif(&bytes)).unwrap();
        window.frame(1, || open_gif(&bytes)).unwrap();
        assert_eq!(window.reopens, 3);
    }

    #[test]
    fn test_frame_window_respects_budget() {
        let window = FrameWindow::new(4096, 4096);
        assert_eq!(window.limit, 1);
        assert_eq!(FrameWindow::new(64, 64).limit, FRAME_WINDOW_BYTES / (64 * 64 * 4));
    }

    #[test]
    fn test_frame_window_falls_back_to_first_frame() {
        let bytes = Bytes::from(fixtures::gif(2, 2, &[[9, 9, 9, 255]], 10));
        let mut window = FrameWindow::new(2, 2);

        let frame = window.frame(4, || open_gif(&bytes)).unwrap();
        assert_eq!(frame.get_pixel(1, 1).0, [9, 9, 9, 255]);
    }

    #[test]
    fn test_draw_scaled_fits_and_centers() {
        let frame = RgbaImage::from_pixel(4, 2, Rgba([255, 0, 0, 255]));
        let mut output = FrameBuffer::new(4, 4, PixelFormat::Rgba8);
        output.put_rgba(0, 0, [1, 1, 1, 1]);

        draw_scaled(&frame, &mut output);

        assert_eq!(output.rgba_at(0, 0), Some([0, 0, 0, 0]));
        assert_eq!(output.rgba_at(0, 1), Some([255, 0, 0, 255]));
        assert_eq!(output.rgba_at(3, 2), Some([255, 0, 0, 255]));
        assert_eq!(output.rgba_at(3, 3), Some([0, 0, 0, 0]));
    }

    #[test]
    fn test_draw_scaled_downscales_without_cropping() {
        let frame = RgbaImage::from_pixel(8, 8, Rgba([0, 255, 0, 255]));
        let mut output = FrameBuffer::new(4, 2, PixelFormat::Rgba8);

        draw_scaled(&frame, &mut output);

        assert_eq!(output.rgba_at(0, 0), Some([0, 0, 0, 0]));
        assert_eq!(output.rgba_at(1, 0), Some([0, 255, 0, 255]));
        assert_eq!(output.rgba_at(2, 1), Some([0, 255, 0, 255]));
        assert_eq!(output.rgba_at(3, 1), Some([0, 0, 0, 0]));
    }

    #[test]
    fn test_factory_rejects_disabled_webp_immediately() {
        let factory = AnimatedDecoderFactory::detect().with_animated_webp(false);
        let bytes = Bytes::from(fixtures::webp_skeleton(4, 4, &[100, 100], 0));

        let err = factory.create(bytes, AnimatedFormat::WebP).err().unwrap();
        assert!(err.is_unsupported());
        assert!(factory.supports(AnimatedFormat::Gif));
    }

    #[test]
    fn test_probe_gif() {
        let factory = AnimatedDecoderFactory::detect();
        let bytes = Bytes::from(fixtures::gif(6, 3, &[[255, 0, 0, 255], [0, 0, 255, 255]], 50));

        let asset = factory.probe(bytes.clone(), AnimatedFormat::Gif).unwrap();
        assert_eq!(asset.frame_count, 2);
        assert_eq!((asset.width, asset.height), (6, 3));
        assert_eq!(asset.bytes, bytes);
    }
}
