//! Infrastructure layer with external service adapters.

/// Application configuration.
pub mod config;
/// Image handling (decoding, caching, loading, playback).
pub mod image;

pub use config::{AppConfig, CliArgs, Command, ConfigError, ConfigStore, LogLevel};
pub use image::{
    AnimatedDecoderFactory, CacheStats, DiskImageCache, FrameBufferPool, ImageLoadedEvent,
    ImageLoader, ImageLoaderConfig, MemoryImageCache, PlaybackHandle, TransformPipeline,
    spawn_playback,
};
