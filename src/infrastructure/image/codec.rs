//! Raster capabilities backed by the `image` crate.

use crate::domain::ports::{BlurPort, LoadError, LoadResult, RasterDecoderPort};

/// Still-image decoder using `image::load_from_memory`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrateDecoder;

impl RasterDecoderPort for ImageCrateDecoder {
    fn decode(&self, bytes: &[u8]) -> LoadResult<image::DynamicImage> {
        image::load_from_memory(bytes)
            .map_err(|e| LoadError::DecodeError(format!("Failed to decode image: {e}")))
    }
}

/// CPU gaussian blur.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrateBlur;

impl ImageCrateBlur {
    /// Converts a blur radius into a gaussian sigma.
    fn sigma(radius: f32) -> f32 {
        radius / 2.0
    }
}

impl BlurPort for ImageCrateBlur {
    fn blur(&self, raster: &image::DynamicImage, radius: f32) -> Option<image::DynamicImage> {
        if radius <= 0.0 {
            return Some(raster.clone());
        }
        Some(raster.blur(Self::sigma(radius)))
    }
}
