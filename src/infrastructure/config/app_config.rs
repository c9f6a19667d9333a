//! Application configuration.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::infrastructure::image::ImageLoaderConfig;
use crate::infrastructure::image::downloader::DEFAULT_MAX_CONCURRENT_DOWNLOADS;
use crate::infrastructure::image::frame_pool::DEFAULT_POOL_CAPACITY;
use crate::infrastructure::image::memory_cache::DEFAULT_MEMORY_BUDGET_KB;

const APP_NAME: &str = "oxipix";
const APP_QUALIFIER: &str = "com";
const APP_ORGANIZATION: &str = "oxipix";

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Converts to tracing level.
    #[must_use]
    pub const fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Application configuration from file and CLI.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration file path.
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[serde(skip)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Network configuration.
    #[serde(default)]
    pub network: NetworkConfig,

    /// Decoder configuration.
    #[serde(default)]
    pub decoder: DecoderConfig,
}

/// Cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Memory budget in kilobytes. The memory cache uses an eighth of it.
    #[serde(default = "default_memory_budget_kb")]
    pub memory_budget_kb: u64,

    /// Disk cache directory. Defaults to the platform cache dir.
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Frame buffers pooled per frame size.
    #[serde(default = "default_frame_pool_capacity")]
    pub frame_pool_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_budget_kb: default_memory_budget_kb(),
            directory: None,
            frame_pool_capacity: default_frame_pool_capacity(),
        }
    }
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Connect timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Read timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub read_timeout_secs: u64,

    /// Maximum concurrent downloads.
    #[serde(default = "default_max_concurrent_downloads")]
    pub max_concurrent_downloads: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_timeout_secs(),
            read_timeout_secs: default_timeout_secs(),
            max_concurrent_downloads: default_max_concurrent_downloads(),
        }
    }
}

/// Decoder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Play animated WebP. Ignored when support is not compiled in.
    #[serde(default = "default_true")]
    pub animated_webp: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            animated_webp: true,
        }
    }
}

fn default_memory_budget_kb() -> u64 {
    DEFAULT_MEMORY_BUDGET_KB
}

fn default_frame_pool_capacity() -> usize {
    DEFAULT_POOL_CAPACITY
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_max_concurrent_downloads() -> usize {
    DEFAULT_MAX_CONCURRENT_DOWNLOADS
}

fn default_true() -> bool {
    true
}

use super::args::CliArgs;

impl AppConfig {
    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: &CliArgs) {
        if let Some(config_path) = &args.config {
            self.config = Some(config_path.clone());
        }
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if let Some(cache_dir) = &args.cache_dir {
            self.cache.directory = Some(cache_dir.clone());
        }
        if let Some(memory_budget_kb) = args.memory_budget_kb {
            self.cache.memory_budget_kb = memory_budget_kb;
        }
        if let Some(max_downloads) = args.max_concurrent_downloads {
            self.network.max_concurrent_downloads = max_downloads;
        }
        if let Some(animated_webp) = args.animated_webp {
            self.decoder.animated_webp = animated_webp;
        }
    }

    /// Builds the loader configuration.
    #[must_use]
    pub fn loader_config(&self) -> ImageLoaderConfig {
        ImageLoaderConfig {
            memory_budget_kb: self.cache.memory_budget_kb,
            cache_dir: self.cache.directory.clone(),
            frame_pool_capacity: self.cache.frame_pool_capacity,
            connect_timeout: Duration::from_secs(self.network.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.network.read_timeout_secs),
            max_concurrent_downloads: self.network.max_concurrent_downloads,
            animated_webp: self.decoder.animated_webp,
        }
    }

    /// Returns default config file path.
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Returns default log file path.
    #[must_use]
    pub fn default_log_path() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.data_dir().join("oxipix.log"))
    }

    /// Returns effective log path.
    #[must_use]
    pub fn effective_log_path(&self) -> Option<PathBuf> {
        self.log_path.clone().or_else(Self::default_log_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_parse_partial_config() {
        let toml_content = r#"
            log_level = "debug"

            [cache]
            memory_budget_kb = 2048

            [decoder]
            animated_webp = false
        "#;

        let config: AppConfig = toml::from_str(toml_content).expect("Failed to parse config");

        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.cache.memory_budget_kb, 2048);
        assert_eq!(config.cache.frame_pool_capacity, DEFAULT_POOL_CAPACITY);
        assert!(!config.decoder.animated_webp);
        assert_eq!(config.network.connect_timeout_secs, 5);
    }

    #[test]
    fn test_log_level_maps_to_tracing() {
        assert_eq!(LogLevel::Trace.to_tracing_level(), tracing::Level::TRACE);
        assert_eq!(LogLevel::default().to_tracing_level(), tracing::Level::INFO);
        assert_eq!(LogLevel::Error.to_tracing_level(), tracing::Level::ERROR);
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();

        assert_eq!(config.log_level, LogLevel::Info);
        assert!(config.cache.directory.is_none());
        assert!(config.decoder.animated_webp); // default_true
        assert_eq!(config.network.max_concurrent_downloads, 4);
    }

    #[test]
    fn test_merge_with_args_overrides() {
        let args = CliArgs::parse_from([
            "oxipix",
            "--log-level",
            "trace",
            "--memory-budget-kb",
            "1024",
            "--animated-webp",
            "false",
            "clear",
        ]);
        let mut config = AppConfig::default();

        config.merge_with_args(&args);

        assert_eq!(config.log_level, LogLevel::Trace);
        assert_eq!(config.cache.memory_budget_kb, 1024);
        assert!(!config.decoder.animated_webp);
    }

    #[test]
    fn test_loader_config_conversion() {
        let mut config = AppConfig::default();
        config.network.read_timeout_secs = 12;
        config.cache.directory = Some(PathBuf::from("/tmp/oxipix-test"));

        let loader = config.loader_config();

        assert_eq!(loader.read_timeout, Duration::from_secs(12));
        assert_eq!(loader.connect_timeout, Duration::from_secs(5));
        assert_eq!(loader.cache_dir, Some(PathBuf::from("/tmp/oxipix-test")));
    }
}
