//! reqwest-backed `Transport`

use crate::error::{NetworkError, NetworkResult};
use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, Url};
use std::collections::BTreeMap;
use std::time::Duration;
use tradecost_config::{endpoint_base, NetworkConfig};
use tradecost_core::{Method, Request, RequestError, Transport};

/// Longest error body kept in a `RequestError` message
const MAX_ERROR_BODY: usize = 200;

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Whole-request timeout
    pub timeout: Duration,
    /// User agent string
    pub user_agent: String,
    /// Base URL for each endpoint name
    pub endpoints: BTreeMap<String, String>,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: format!("TradeCost/{}", env!("CARGO_PKG_VERSION")),
            endpoints: BTreeMap::new(),
        }
    }
}

impl From<&NetworkConfig> for HttpTransportConfig {
    fn from(config: &NetworkConfig) -> Self {
        Self {
            timeout: config.request_timeout(),
            user_agent: config.user_agent.clone(),
            endpoints: config.endpoints.clone(),
        }
    }
}

/// Sends requests over HTTP and decodes JSON bodies
///
/// Performs exactly one attempt per `send`; retries, circuit breaking and
/// caching happen above this layer.
#[derive(Clone)]
pub struct HttpTransport {
    inner: ReqwestClient,
    config: HttpTransportConfig,
    bases: BTreeMap<String, Url>,
}

impl HttpTransport {
    /// Creates a transport with custom configuration
    ///
    /// Fails if any endpoint base URL cannot be parsed.
    pub fn new(config: HttpTransportConfig) -> NetworkResult<Self> {
        let bases = config
            .endpoints
            .iter()
            .map(|(name, raw)| Ok((name.clone(), endpoint_base(name, raw)?)))
            .collect::<NetworkResult<BTreeMap<_, _>>>()?;

        let client = ReqwestClient::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(NetworkError::Http)?;

        Ok(Self {
            inner: client,
            config,
            bases,
        })
    }

    /// Creates a transport from the `[network]` config section
    pub fn from_config(config: &NetworkConfig) -> NetworkResult<Self> {
        Self::new(HttpTransportConfig::from(config))
    }

    /// Returns the configuration
    pub fn config(&self) -> &HttpTransportConfig {
        &self.config
    }

    /// Full URL for `request`
    ///
    /// The path is always resolved below the endpoint base, even when its
    /// first segment looks like a scheme.
    pub fn url_for(&self, request: &Request) -> Result<Url, RequestError> {
        let base = self
            .bases
            .get(request.endpoint.as_str())
            .ok_or_else(|| RequestError::Misconfigured {
                message: format!("no base URL configured for endpoint '{}'", request.endpoint),
            })?;

        let relative = format!("./{}", request.path.trim_start_matches('/'));
        base.join(&relative).map_err(|e| RequestError::Misconfigured {
            message: format!("cannot resolve '{}' against {}: {}", request.path, base, e),
        })
    }

    fn classify(&self, error: reqwest::Error) -> RequestError {
        if error.is_timeout() {
            RequestError::timeout(self.config.timeout)
        } else if error.is_builder() {
            RequestError::Misconfigured {
                message: error.to_string(),
            }
        } else if error.is_decode() {
            RequestError::invalid_response(error.to_string())
        } else {
            RequestError::network(error.to_string())
        }
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("Unknown status")
            .to_string();
    }
    body.chars().take(MAX_ERROR_BODY).collect()
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &Request) -> Result<serde_json::Value, RequestError> {
        let url = self.url_for(request)?;
        log::debug!("{} {}", request.method, url);

        let mut builder = self
            .inner
            .request(to_reqwest_method(request.method), url.clone());
        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| self.classify(e))?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = error_message(status, &body);
            return Err(RequestError::from_status(status.as_u16(), message.clone())
                .unwrap_or_else(|| RequestError::invalid_response(format!(
                    "unexpected status {}: {}",
                    status.as_u16(),
                    message
                ))));
        }

        let bytes = response.bytes().await.map_err(|e| self.classify(e))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::Value::Null);
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| RequestError::invalid_response(format!("{} from {}", e, url)))
    }
}
