//! Image handling infrastructure.
//!
//! This module provides:
//! - Format sniffing and lazy animated decoding
//! - Frame buffer pooling and playback
//! - Memory caching with size-weighted LRU eviction
//! - Disk caching for persistence
//! - The async loading pipeline

pub mod codec;
pub mod decoder;
pub mod disk_cache;
pub mod downloader;
pub mod frame_pool;
pub mod loader;
pub mod memory_cache;
pub mod playback;
pub mod sniffer;
pub mod transform;

pub use codec::{ImageCrateBlur, ImageCrateDecoder};
pub use decoder::{AnimatedDecoder, AnimatedDecoderFactory, GifDecoder, WebPDecoder};
pub use disk_cache::DiskImageCache;
pub use downloader::HttpDownloader;
pub use frame_pool::{FrameBufferPool, PoolStats};
pub use loader::{ImageLoadedEvent, ImageLoader, ImageLoaderConfig};
pub use memory_cache::{CacheStats, MemoryImageCache};
pub use playback::{PlaybackHandle, PlaybackSummary, spawn_playback};
pub use transform::TransformPipeline;
