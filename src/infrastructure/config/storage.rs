//! Config file persistence.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use super::app_config::AppConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to determine config directory")]
    ConfigDirNotFound,
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("toml serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl ConfigError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Reads and writes one `config.toml`.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Store for an explicit file.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Store for `path_override`, or the platform config file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ConfigDirNotFound` when no override is given and
    /// the platform has no config directory.
    pub fn locate(path_override: Option<&Path>) -> Result<Self, ConfigError> {
        path_override
            .map(Path::to_path_buf)
            .or_else(AppConfig::default_config_path)
            .map(Self::new)
            .ok_or(ConfigError::ConfigDirNotFound)
    }

    /// Config file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the configuration, writing defaults when the file is absent.
    /// A malformed file yields defaults and is left untouched.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or created.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = if self.path.exists() {
            let content =
                fs::read_to_string(&self.path).map_err(|e| ConfigError::io(&self.path, e))?;
            toml::from_str::<AppConfig>(&content).unwrap_or_else(|e| {
                warn!(path = %self.path.display(), error = %e, "Malformed config file, using defaults");
                AppConfig::default()
            })
        } else {
            info!(path = %self.path.display(), "Config file not found, writing defaults");
            let config = AppConfig::default();
            self.save(&config)?;
            config
        };

        config.config = Some(self.path.clone());
        Ok(config)
    }

    /// Writes `config` atomically, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if serialization or any file operation fails.
    pub fn save(&self, config: &AppConfig) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(config)?;
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(|e| ConfigError::io(parent, e))?;

        let mut temp_file =
            tempfile::NamedTempFile::new_in(parent).map_err(|e| ConfigError::io(parent, e))?;
        temp_file
            .write_all(content.as_bytes())
            .map_err(|e| ConfigError::io(temp_file.path(), e))?;
        temp_file
            .persist(&self.path)
            .map_err(|e| ConfigError::io(&self.path, e.error))?;

        Ok(())
    }
}
