use super::app_config::LogLevel;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "oxipix",
    version,
    about = "Image loading pipeline with tiered caching and animated playback",
    long_about = None
)]
pub struct CliArgs {
    /// Configuration file path.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH")]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Disk cache directory.
    #[arg(long, value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,

    /// Memory budget in kilobytes.
    #[arg(long)]
    pub memory_budget_kb: Option<u64>,

    /// Maximum concurrent downloads.
    #[arg(long)]
    pub max_concurrent_downloads: Option<usize>,

    /// Enable animated WebP playback.
    #[arg(long)]
    pub animated_webp: Option<bool>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load an image through the cache tiers and report where it came from.
    Load {
        /// Image URL.
        url: String,

        /// Transform: none, rounded:R, circle[:W[:#rrggbb]], blur[:R].
        #[arg(short, long, default_value = "none")]
        transform: String,

        /// Write the result as PNG (static) or the original container (animated).
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Prefetch images into the cache.
    Prefetch {
        /// Image URLs.
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Play an animated image and report frame timing.
    Play {
        /// Image URL.
        url: String,

        /// Stop after this many frames.
        #[arg(short, long, default_value_t = 30)]
        frames: u64,
    },

    /// Clear the memory and disk caches.
    Clear,
}
