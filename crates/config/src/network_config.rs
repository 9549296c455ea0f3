//! HTTP transport and connectivity probing section

use crate::validation::{ConfigSection, ValidationError, Validator};
use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// Settings for the HTTP transport and the connectivity checker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Whole-request timeout enforced by the HTTP client
    pub request_timeout_secs: u64,

    /// User-Agent header sent with every request
    pub user_agent: String,

    /// URLs probed to decide whether the device is online
    ///
    /// When empty the device is assumed to be online.
    pub connectivity_urls: Vec<String>,

    /// Period between connectivity probes
    pub connectivity_interval_secs: u64,

    /// Base URL for each logical endpoint name
    pub endpoints: BTreeMap<String, String>,
}

impl NetworkConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connectivity_interval(&self) -> Duration {
        Duration::from_secs(self.connectivity_interval_secs)
    }

    /// Base URL configured for `endpoint`
    pub fn endpoint_url(&self, endpoint: &str) -> Option<&str> {
        self.endpoints.get(endpoint).map(String::as_str)
    }
}

/// Parses the base URL of `endpoint`
///
/// The path always ends with `/` so that joining a resource path appends to
/// it instead of replacing its last segment.
pub fn endpoint_base(endpoint: &str, raw: &str) -> ConfigResult<Url> {
    let invalid = |reason: String| ConfigError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        url: raw.to_string(),
        reason,
    };

    let mut url = Validator::parse_http_url(raw).map_err(invalid)?;
    if url.query().is_some() || url.fragment().is_some() {
        return Err(invalid("base URL must not carry a query or fragment".to_string()));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            user_agent: format!("TradeCost/{}", env!("CARGO_PKG_VERSION")),
            connectivity_urls: Vec::new(),
            connectivity_interval_secs: 15,
            endpoints: BTreeMap::new(),
        }
    }
}

impl ConfigSection for NetworkConfig {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut results = vec![
            Validator::in_range(self.request_timeout_secs, 1, 600, "network.request_timeout_secs"),
            Validator::not_empty(&self.user_agent, "network.user_agent"),
            Validator::in_range(
                self.connectivity_interval_secs,
                1,
                3600,
                "network.connectivity_interval_secs",
            ),
        ];

        for (name, url) in &self.endpoints {
            results.push(Validator::not_empty(name, "network.endpoints"));
            results.push(Validator::http_url(url, &format!("network.endpoints.{}", name)));
        }

        for (i, url) in self.connectivity_urls.iter().enumerate() {
            results.push(Validator::http_url(
                url,
                &format!("network.connectivity_urls[{}]", i),
            ));
        }

        Validator::collect_errors(results)
    }

    fn merge(&mut self, other: Self) {
        self.request_timeout_secs = other.request_timeout_secs;
        self.user_agent = other.user_agent;
        self.endpoints.extend(other.endpoints);
        self.connectivity_urls = other.connectivity_urls;
        self.connectivity_interval_secs = other.connectivity_interval_secs;
    }

    fn section_name(&self) -> &'static str {
        "network"
    }
}
