//! Ports for the platform raster capabilities.

use super::image_cache_port::LoadResult;

/// Decodes a single still frame from encoded bytes.
#[cfg_attr(test, mockall::automock)]
pub trait RasterDecoderPort: Send + Sync {
    /// Decodes `bytes` into a raster.
    ///
    /// # Errors
    /// Returns `LoadError::DecodeError` if the bytes are not a supported image.
    fn decode(&self, bytes: &[u8]) -> LoadResult<image::DynamicImage>;
}

/// Blurs a raster. Returns None when the capability is unavailable.
#[cfg_attr(test, mockall::automock)]
pub trait BlurPort: Send + Sync {
    /// Produces a blurred copy of `raster`. The input is never modified.
    fn blur(&self, raster: &image::DynamicImage, radius: f32) -> Option<image::DynamicImage>;
}
