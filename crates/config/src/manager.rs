//! Configuration manager - main API for config operations

use crate::persistence::ConfigPersistence;
use crate::{Config, ConfigError, ConfigResult};
use directories::ProjectDirs;
use std::path::PathBuf;
use std::str::FromStr;

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "TRADECOST";

/// Main configuration manager
///
/// Resolves the config file location and wraps loading, saving and
/// validation.
pub struct ConfigManager {
    persistence: ConfigPersistence,
    config_dir: PathBuf,
}

impl ConfigManager {
    /// Creates a config manager using the platform config directory
    ///
    /// - Linux: `~/.config/tradecost/`
    /// - macOS: `~/Library/Application Support/tradecost/`
    /// - Windows: `%APPDATA%\tradecost\`
    pub fn new() -> ConfigResult<Self> {
        let config_dir = Self::default_config_dir()?;
        Self::with_directory(config_dir)
    }

    /// Creates a config manager with a custom config directory
    pub fn with_directory(config_dir: PathBuf) -> ConfigResult<Self> {
        let config_path = config_dir.join("config.toml");
        let persistence = ConfigPersistence::new(config_path);

        Ok(Self {
            persistence,
            config_dir,
        })
    }

    fn default_config_dir() -> ConfigResult<PathBuf> {
        ProjectDirs::from("", "", "tradecost")
            .map(|proj_dirs| proj_dirs.config_dir().to_path_buf())
            .ok_or(ConfigError::NoPlatformDir { kind: "config" })
    }

    /// Returns the config directory path
    pub fn config_dir(&self) -> &PathBuf {
        &self.config_dir
    }

    /// Returns the full config file path
    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Loads the configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file is corrupted, returns an error.
    pub fn load(&self) -> ConfigResult<Config> {
        self.persistence.load()
    }

    /// Loads the configuration, falling back to defaults on any error
    pub fn load_or_default(&self) -> Config {
        match self.load() {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Failed to load config: {}, using defaults", e);
                Config::default()
            }
        }
    }

    /// Validates and atomically saves the configuration
    pub fn save(&self, config: &Config) -> ConfigResult<()> {
        self.persistence.save(config)
    }

    /// Loads the config, applies `update_fn` and saves the result
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use tradecost_config::ConfigManager;
    /// # let manager = ConfigManager::new().unwrap();
    /// manager.update(|config| {
    ///     config.retry.max_retries = 5;
    /// }).expect("Failed to update config");
    /// ```
    pub fn update<F>(&self, update_fn: F) -> ConfigResult<()>
    where
        F: FnOnce(&mut Config),
    {
        let mut config = self.load()?;
        update_fn(&mut config);
        self.save(&config)
    }

    /// Generates a default config file if one doesn't exist
    ///
    /// Returns Ok(true) if a new file was created, Ok(false) if one already exists.
    pub fn initialize(&self) -> ConfigResult<bool> {
        if self.config_path().exists() {
            log::info!(
                "Config file already exists at {}",
                self.config_path().display()
            );
            return Ok(false);
        }

        self.persistence.generate_default_with_comments()?;
        Ok(true)
    }

    /// Overwrites the config file with default values
    pub fn reset(&self) -> ConfigResult<()> {
        self.save(&Config::default())
    }

    /// Validates the current configuration file
    ///
    /// Returns every validation problem as a message; empty means valid.
    pub fn validate(&self) -> ConfigResult<Vec<String>> {
        let config = self.load()?;

        match config.validate() {
            Ok(()) => Ok(Vec::new()),
            Err(errors) => Ok(errors.iter().map(|e| e.to_string()).collect()),
        }
    }

    /// Loads the config and applies environment variable overrides
    ///
    /// Variables follow the pattern `TRADECOST_<SECTION>_<FIELD>`, for
    /// example `TRADECOST_RETRY_MAX_RETRIES=5`. Unparsable values are
    /// ignored with a warning.
    pub fn load_with_env_overrides(&self) -> ConfigResult<Config> {
        let mut config = self.load()?;
        apply_overrides(&mut config, |name| std::env::var(name).ok());

        if let Err(errors) = config.validate() {
            log::warn!(
                "Config validation warnings after env overrides: {:?}",
                errors
            );
        }

        Ok(config)
    }
}

/// Applies `TRADECOST_<SECTION>_<FIELD>` overrides read through `lookup`
pub fn apply_overrides<L>(config: &mut Config, lookup: L)
where
    L: Fn(&str) -> Option<String>,
{
    let over = Overrides { lookup: &lookup };

    over.apply("CACHE_NAMESPACE", &mut config.cache.namespace);
    over.apply("CACHE_SCHEMA_VERSION", &mut config.cache.schema_version);
    if let Some(dir) = over.get("CACHE_DATA_DIR") {
        config.cache.data_dir = Some(PathBuf::from(dir));
    }
    over.apply("CACHE_LOCAL_QUOTA_BYTES", &mut config.cache.local_quota_bytes);
    over.apply("CACHE_MEMORY_CAPACITY", &mut config.cache.memory_capacity);
    over.apply("CACHE_DEFAULT_TTL_SECS", &mut config.cache.default_ttl_secs);

    over.apply("CIRCUIT_FAILURE_THRESHOLD", &mut config.circuit.failure_threshold);
    over.apply("CIRCUIT_HALF_OPEN_TIMEOUT_MS", &mut config.circuit.half_open_timeout_ms);

    over.apply("RETRY_MAX_RETRIES", &mut config.retry.max_retries);
    over.apply("RETRY_INITIAL_BACKOFF_MS", &mut config.retry.initial_backoff_ms);
    over.apply("RETRY_ATTEMPT_TIMEOUT_MS", &mut config.retry.attempt_timeout_ms);

    over.apply("SYNC_BATCH_SIZE", &mut config.sync.batch_size);
    over.apply("SYNC_MAX_ATTEMPTS", &mut config.sync.max_attempts);
    over.apply("SYNC_FLUSH_INTERVAL_SECS", &mut config.sync.flush_interval_secs);

    over.apply("NETWORK_REQUEST_TIMEOUT_SECS", &mut config.network.request_timeout_secs);
    over.apply("NETWORK_USER_AGENT", &mut config.network.user_agent);
    over.apply(
        "NETWORK_CONNECTIVITY_INTERVAL_SECS",
        &mut config.network.connectivity_interval_secs,
    );
    if let Some(urls) = over.get("NETWORK_CONNECTIVITY_URLS") {
        config.network.connectivity_urls = urls
            .split(',')
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(String::from)
            .collect();
    }
}

struct Overrides<'a, L> {
    lookup: &'a L,
}

impl<L> Overrides<'_, L>
where
    L: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(&format!("{}_{}", ENV_PREFIX, key))
    }

    fn apply<T: FromStr>(&self, key: &str, target: &mut T) {
        let Some(raw) = self.get(key) else {
            return;
        };

        match raw.trim().parse::<T>() {
            Ok(value) => {
                log::info!("Config override from {}_{}", ENV_PREFIX, key);
                *target = value;
            }
            Err(_) => log::warn!(
                "Ignoring {}_{}: cannot parse '{}'",
                ENV_PREFIX,
                key,
                raw
            ),
        }
    }
}
