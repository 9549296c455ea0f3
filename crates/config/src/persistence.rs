//! Reading and writing the config file
//!
//! Writes go through a temporary file in the same directory and an atomic
//! rename, so the file on disk is always either the old or the new version.
//! The previous version is copied to `config.toml.backup` first.

use crate::{Config, ConfigError, ConfigResult, CONFIG_VERSION};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const DEFAULT_HEADER: &str = "\
# TradeCost data layer configuration
#
# Every key is optional; missing keys take their default value.
# Any key can be overridden with TRADECOST_<SECTION>_<FIELD>,
# e.g. TRADECOST_RETRY_MAX_RETRIES=5.
#
# [network.endpoints] maps endpoint names to base URLs:
#   prices = \"https://prices.example.com/api\"

";

/// Handles configuration file persistence
pub struct ConfigPersistence {
    config_path: PathBuf,
}

impl ConfigPersistence {
    /// Creates a new persistence handler for the given config file path
    pub fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// Loads configuration from file
    ///
    /// A missing file yields the default config. An empty or unparsable
    /// file is an error; values that fail validation only log a warning.
    pub fn load(&self) -> ConfigResult<Config> {
        if !self.config_path.exists() {
            log::info!(
                "Config file not found at {}, using defaults",
                self.config_path.display()
            );
            return Ok(Config::default());
        }

        let contents =
            fs::read_to_string(&self.config_path).map_err(|e| ConfigError::Read {
                path: self.config_path.clone(),
                source: e,
            })?;

        // A blank file is treated as corrupt rather than as defaults
        if contents.trim().is_empty() {
            return Err(ConfigError::Read {
                path: self.config_path.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "Config file is empty or contains only whitespace",
                ),
            });
        }

        let config: Config = toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: self.config_path.clone(),
            source: e,
        })?;

        if config.version > CONFIG_VERSION {
            log::warn!(
                "Config version {} is newer than supported version {}, using as-is",
                config.version,
                CONFIG_VERSION
            );
        }

        if let Err(errors) = config.validate() {
            for error in &errors {
                log::warn!("Config problem in {}: {}", self.config_path.display(), error);
            }
        }

        Ok(config)
    }

    /// Saves configuration to file atomically
    pub fn save(&self, config: &Config) -> ConfigResult<()> {
        let toml_string = self.render(config)?;
        self.write(&toml_string)?;
        log::info!("Config saved to {}", self.config_path.display());
        Ok(())
    }

    /// Writes the default config preceded by an explanatory header
    pub fn generate_default_with_comments(&self) -> ConfigResult<()> {
        let body = self.render(&Config::default())?;
        self.write(&format!("{}{}", DEFAULT_HEADER, body))?;

        log::info!("Generated default config at {}", self.config_path.display());
        Ok(())
    }

    /// Validates and serializes a config
    fn render(&self, config: &Config) -> ConfigResult<String> {
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(toml::to_string_pretty(config)?)
    }

    fn write(&self, contents: &str) -> ConfigResult<()> {
        if let Some(parent) = self.config_path.parent() {
            self.ensure_directory_exists(parent)?;
        }

        if self.config_path.exists() {
            self.backup_config()?;
        }

        let temp_file = self.create_temp_file()?;
        self.write_atomic(temp_file, contents)
    }

    /// Ensures a directory exists, creating it if necessary
    fn ensure_directory_exists(&self, path: &Path) -> ConfigResult<()> {
        if !path.exists() {
            fs::create_dir_all(path).map_err(|e| ConfigError::Write {
                path: path.to_path_buf(),
                source: e,
            })?;
            log::info!("Created config directory: {}", path.display());
        }
        Ok(())
    }

    /// Copies the current config file next to itself
    fn backup_config(&self) -> ConfigResult<()> {
        let backup_path = self.config_path.with_extension("toml.backup");
        fs::copy(&self.config_path, &backup_path)
            .map_err(|e| ConfigError::Write {
                path: backup_path.clone(),
                source: e,
            })?;
        log::debug!("Backed up config to {}", backup_path.display());
        Ok(())
    }

    /// Creates a temporary file in the same directory as the config file
    fn create_temp_file(&self) -> ConfigResult<NamedTempFile> {
        let dir = match self.config_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        NamedTempFile::new_in(dir).map_err(|e| ConfigError::Write {
            path: dir.to_path_buf(),
            source: e,
        })
    }

    /// Writes content to a temporary file and atomically renames it
    fn write_atomic(&self, mut temp_file: NamedTempFile, content: &str) -> ConfigResult<()> {
        let staged = temp_file.path().to_path_buf();
        temp_file
            .write_all(content.as_bytes())
            .and_then(|()| temp_file.flush())
            .map_err(|e| ConfigError::Write {
                path: staged,
                source: e,
            })?;

        temp_file
            .persist(&self.config_path)
            .map_err(|e| ConfigError::Write {
                path: self.config_path.clone(),
                source: e.error,
            })?;

        Ok(())
    }
}
