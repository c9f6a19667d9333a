//! Transformations over static rasters.

use std::sync::Arc;

use image::{DynamicImage, Rgba, RgbaImage};
use tracing::{debug, trace};

use crate::domain::entities::{ImageAsset, TransformDescriptor};
use crate::domain::ports::BlurPort;

/// Largest blur radius accepted by the blur capability.
pub const MAX_BLUR_RADIUS: f32 = 25.0;

/// Applies [`TransformDescriptor`]s to assets.
///
/// Every operation allocates a new raster; inputs are never mutated.
/// Animated assets are returned unchanged for every descriptor.
#[derive(Clone, Default)]
pub struct TransformPipeline {
    blur: Option<Arc<dyn BlurPort>>,
}

impl TransformPipeline {
    /// Creates a pipeline with an optional blur capability.
    #[must_use]
    pub fn new(blur: Option<Arc<dyn BlurPort>>) -> Self {
        Self { blur }
    }

    /// Returns true if a blur capability is installed.
    #[must_use]
    pub fn has_blur(&self) -> bool {
        self.blur.is_some()
    }

    /// Applies `descriptor` to `asset`.
    #[must_use]
    pub fn apply(&self, asset: &ImageAsset, descriptor: &TransformDescriptor) -> ImageAsset {
        let raster = match asset {
            ImageAsset::Animated(_) => {
                if !descriptor.is_none() {
                    trace!("Skipping transform for animated asset");
                }
                return asset.clone();
            }
            ImageAsset::Static { raster } => raster,
        };

        match *descriptor {
            TransformDescriptor::None => asset.clone(),
            TransformDescriptor::RoundedCorners { radius } => {
                ImageAsset::from_raster(rounded_corners(raster, radius))
            }
            TransformDescriptor::Circle {
                border_width,
                border_color,
            } => ImageAsset::from_raster(circle(raster, border_width, border_color)),
            TransformDescriptor::Blur { radius } => match self.blur(raster, radius) {
                Some(blurred) => ImageAsset::from_raster(blurred),
                None => asset.clone(),
            },
        }
    }

    fn blur(&self, raster: &DynamicImage, radius: f32) -> Option<DynamicImage> {
        let Some(blur) = &self.blur else {
            debug!("Blur unavailable, returning input unchanged");
            return None;
        };
        let radius = radius.clamp(0.0, MAX_BLUR_RADIUS);
        let blurred = blur.blur(raster, radius);
        if blurred.is_none() {
            debug!(radius, "Blur capability declined, returning input unchanged");
        }
        blurred
    }
}

impl std::fmt::Debug for TransformPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformPipeline")
            .field("blur", &self.has_blur())
            .finish()
    }
}

/// Anti-aliased coverage of a pixel at signed distance `inside` from an edge.
fn coverage(inside: f32) -> f32 {
    (inside + 0.5).clamp(0.0, 1.0)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scale_alpha(pixel: &mut Rgba<u8>, factor: f32) {
    pixel.0[3] = (f32::from(pixel.0[3]) * factor).round() as u8;
}

/// Straight-alpha source-over blend of `color` onto `dst`, weighted by `weight`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn blend_over(dst: &mut Rgba<u8>, color: Rgba<u8>, weight: f32) {
    let src_a = f32::from(color.0[3]) / 255.0 * weight;
    if src_a <= 0.0 {
        return;
    }
    let dst_a = f32::from(dst.0[3]) / 255.0;
    let out_a = src_a + dst_a * (1.0 - src_a);
    for channel in 0..3 {
        let src = f32::from(color.0[channel]);
        let old = f32::from(dst.0[channel]);
        let mixed = (src * src_a + old * dst_a * (1.0 - src_a)) / out_a;
        dst.0[channel] = mixed.round().clamp(0.0, 255.0) as u8;
    }
    dst.0[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}

/// Clips `source` to a rounded rectangle over its own bounds.
///
/// Any radius is accepted and capped at half of each side before masking,
/// so oversized radii give a stadium or circle as a canvas round-rect does.
#[allow(clippy::cast_precision_loss)]
fn rounded_corners(source: &DynamicImage, radius: f32) -> DynamicImage {
    let mut output = source.to_rgba8();
    if radius <= 0.0 {
        return DynamicImage::ImageRgba8(output);
    }

    let (w, h) = (output.width() as f32, output.height() as f32);
    let radius = radius.min(w / 2.0).min(h / 2.0);
    for (x, y, pixel) in output.enumerate_pixels_mut() {
        let px = x as f32 + 0.5;
        let py = y as f32 + 0.5;

        let cx = if px < radius {
            radius
        } else if px > w - radius {
            w - radius
        } else {
            px
        };
        let cy = if py < radius {
            radius
        } else if py > h - radius {
            h - radius
        } else {
            py
        };

        if (cx - px).abs() > f32::EPSILON && (cy - py).abs() > f32::EPSILON {
            let distance = (px - cx).hypot(py - cy);
            scale_alpha(pixel, coverage(radius - distance));
        }
    }

    DynamicImage::ImageRgba8(output)
}

/// Crops `source` to its centered square, clips to the inscribed circle and
/// optionally strokes a ring inset by half its width.
#[allow(clippy::cast_precision_loss)]
fn circle(source: &DynamicImage, border_width: f32, border_color: Rgba<u8>) -> DynamicImage {
    let rgba = source.to_rgba8();
    let size = rgba.width().min(rgba.height());
    let left = (rgba.width() - size) / 2;
    let top = (rgba.height() - size) / 2;
    let mut output: RgbaImage = image::imageops::crop_imm(&rgba, left, top, size, size).to_image();

    let center = size as f32 / 2.0;
    let ring_radius = center - border_width / 2.0;
    let half_stroke = border_width / 2.0;

    for (x, y, pixel) in output.enumerate_pixels_mut() {
        let distance = (x as f32 + 0.5 - center).hypot(y as f32 + 0.5 - center);
        scale_alpha(pixel, coverage(center - distance));

        if border_width > 0.0 {
            let ring = coverage(half_stroke - (distance - ring_radius).abs());
            blend_over(pixel, border_color, ring);
        }
    }

    DynamicImage::ImageRgba8(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{AnimatedFormat, AnimatedImage};
    use crate::domain::ports::MockBlurPort;
    use bytes::Bytes;

    fn solid(width: u32, height: u32, color: [u8; 4]) -> ImageAsset {
        ImageAsset::from_raster(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            width,
            height,
            Rgba(color),
        )))
    }

    fn animated() -> ImageAsset {
        ImageAsset::Animated(AnimatedImage {
            bytes: Bytes::from_static(b"GIF89a............"),
            format: AnimatedFormat::Gif,
            frame_count: 4,
            width: 10,
            height: 10,
        })
    }

    fn pixel(asset: &ImageAsset, x: u32, y: u32) -> Rgba<u8> {
        *asset.as_static().unwrap().to_rgba8().get_pixel(x, y)
    }

    #[test]
    fn test_animated_passes_through_every_descriptor() {
        let pipeline = TransformPipeline::default();
        let asset = animated();
        let descriptors = [
            TransformDescriptor::None,
            TransformDescriptor::RoundedCorners { radius: 4.0 },
            TransformDescriptor::Circle {
                border_width: 2.0,
                border_color: Rgba([0, 0, 0, 255]),
            },
            TransformDescriptor::Blur { radius: 10.0 },
        ];

        for descriptor in &descriptors {
            let out = pipeline.apply(&asset, descriptor);
            assert_eq!(out, asset);
            let (a, b) = (out.as_animated().unwrap(), asset.as_animated().unwrap());
            assert_eq!(a.bytes.as_ptr(), b.bytes.as_ptr());
        }
    }

    #[test]
    fn test_none_shares_raster() {
        let asset = solid(4, 4, [10, 20, 30, 255]);
        let out = TransformPipeline::default().apply(&asset, &TransformDescriptor::None);
        assert!(Arc::ptr_eq(out.as_static().unwrap(), asset.as_static().unwrap()));
    }

    #[test]
    fn test_rounded_corners_clears_corners_only() {
        let asset = solid(20, 10, [200, 100, 50, 255]);
        let out = TransformPipeline::default()
            .apply(&asset, &TransformDescriptor::RoundedCorners { radius: 4.0 });

        assert_eq!(out.dimensions(), (20, 10));
        assert_eq!(pixel(&out, 0, 0).0[3], 0);
        assert_eq!(pixel(&out, 19, 9).0[3], 0);
        assert_eq!(pixel(&out, 10, 0).0[3], 255);
        assert_eq!(pixel(&out, 0, 5).0[3], 255);
        assert_eq!(pixel(&out, 10, 5), Rgba([200, 100, 50, 255]));
        // Source untouched.
        assert_eq!(pixel(&asset, 0, 0).0[3], 255);
    }

    #[test]
    fn test_huge_radius_is_bounded_by_geometry() {
        let asset = solid(10, 10, [1, 2, 3, 255]);
        let out = TransformPipeline::default()
            .apply(&asset, &TransformDescriptor::RoundedCorners { radius: 500.0 });

        assert_eq!(out.dimensions(), (10, 10));
        assert_eq!(pixel(&out, 0, 0).0[3], 0);
        assert_eq!(pixel(&out, 5, 5).0[3], 255);
    }

    #[test]
    fn test_circle_crops_to_centered_square() {
        let mut pixels = RgbaImage::from_pixel(30, 10, Rgba([0, 0, 255, 255]));
        pixels.put_pixel(15, 5, Rgba([255, 0, 0, 255]));
        let asset = ImageAsset::from_raster(DynamicImage::ImageRgba8(pixels));

        let out = TransformPipeline::default().apply(
            &asset,
            &TransformDescriptor::Circle {
                border_width: 0.0,
                border_color: Rgba([255, 255, 255, 255]),
            },
        );

        assert_eq!(out.dimensions(), (10, 10));
        assert_eq!(pixel(&out, 5, 5), Rgba([255, 0, 0, 255]));
        assert_eq!(pixel(&out, 0, 0).0[3], 0);
        assert_eq!(pixel(&out, 9, 9).0[3], 0);
    }

    #[test]
    fn test_circle_border_paints_ring() {
        let asset = solid(20, 20, [0, 0, 0, 255]);
        let out = TransformPipeline::default().apply(
            &asset,
            &TransformDescriptor::Circle {
                border_width: 4.0,
                border_color: Rgba([255, 255, 255, 255]),
            },
        );

        // Ring spans radii 6..10 around the center.
        assert_eq!(pixel(&out, 10, 1), Rgba([255, 255, 255, 255]));
        assert_eq!(pixel(&out, 10, 10), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_blur_clamps_radius() {
        let mut blur = MockBlurPort::new();
        blur.expect_blur()
            .withf(|_, radius| (*radius - MAX_BLUR_RADIUS).abs() < f32::EPSILON)
            .times(1)
            .returning(|raster, _| Some(raster.grayscale()));
        let pipeline = TransformPipeline::new(Some(Arc::new(blur)));
        let asset = solid(4, 4, [255, 0, 0, 255]);

        let out = pipeline.apply(&asset, &TransformDescriptor::Blur { radius: 80.0 });

        assert_ne!(out, asset);
        assert_eq!(out.dimensions(), (4, 4));
    }

    #[test]
    fn test_blur_unavailable_returns_input() {
        let mut blur = MockBlurPort::new();
        blur.expect_blur().returning(|_, _| None);
        let declined = TransformPipeline::new(Some(Arc::new(blur)));
        let missing = TransformPipeline::default();
        let asset = solid(4, 4, [9, 9, 9, 255]);

        for pipeline in [declined, missing] {
            let out = pipeline.apply(&asset, &TransformDescriptor::Blur { radius: 5.0 });
            assert!(Arc::ptr_eq(out.as_static().unwrap(), asset.as_static().unwrap()));
        }
    }
}
