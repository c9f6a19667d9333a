//! Port definitions for the loading pipeline.

mod downloader_port;
mod image_cache_port;
mod raster_port;

pub use downloader_port::DownloaderPort;
pub use image_cache_port::{ImageCachePort, ImageLoaderPort, LoadError, LoadResult};
#[cfg(test)]
pub use raster_port::{MockBlurPort, MockRasterDecoderPort};
pub use raster_port::{BlurPort, RasterDecoderPort};
