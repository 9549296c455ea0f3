//! Configuration for the TradeCost data layer
//!
//! `config.toml` has one section per component: `[cache]` for the tiers and
//! the persisted-state namespace, `[circuit]` and `[retry]` for the
//! resilience policies, `[sync]` for the offline queue and `[network]` for
//! the HTTP transport and its endpoint base URLs. Sections convert
//! themselves into the runtime types they configure (`to_policy`,
//! `to_breaker_config`, `to_queue_config`, `endpoint_base`).
//!
//! Loading never fails on out-of-range values; those are logged and left
//! for `Config::validate`, which `DataLayer::init` and `ConfigManager::save`
//! both enforce. Environment variables named `TRADECOST_<SECTION>_<FIELD>`
//! override the file.
//!
//! ```rust,no_run
//! use tradecost_config::ConfigManager;
//!
//! let manager = ConfigManager::new().expect("no config directory");
//! let config = manager.load_with_env_overrides().expect("unreadable config");
//! if let Err(problems) = config.validate() {
//!     for problem in problems {
//!         eprintln!("{}", problem);
//!     }
//! }
//! ```

mod error;
mod manager;
mod persistence;
mod validation;

// Config sections
mod cache_config;
mod network_config;
mod resilience_config;
mod sync_config;

pub use error::{ConfigError, ConfigResult, ValidationError};
pub use manager::{apply_overrides, ConfigManager, ENV_PREFIX};
pub use validation::{ConfigSection, Validator};

pub use cache_config::CacheConfig;
pub use network_config::{endpoint_base, NetworkConfig};
pub use resilience_config::{CircuitConfig, RetryConfig};
pub use sync_config::SyncConfig;

use serde::{Deserialize, Serialize};

/// Current config file format version
pub const CONFIG_VERSION: u32 = 1;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Config file format version
    pub version: u32,

    pub cache: CacheConfig,
    pub circuit: CircuitConfig,
    pub retry: RetryConfig,
    pub sync: SyncConfig,
    pub network: NetworkConfig,
}

impl Config {
    /// Validates every section, collecting all problems in section order
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let errors: Vec<ValidationError> = [
            self.cache.validate(),
            self.circuit.validate(),
            self.retry.validate(),
            self.sync.validate(),
            self.network.validate(),
        ]
        .into_iter()
        .filter_map(Result::err)
        .flatten()
        .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            cache: CacheConfig::default(),
            circuit: CircuitConfig::default(),
            retry: RetryConfig::default(),
            sync: SyncConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}
