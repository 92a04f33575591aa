//! HTTP batch resolver implementation.
//!
//! POSTs `{ "paths": [...], "ttlSeconds": n }` to the signing endpoint and
//! expects `{ "success": bool, "urls": { path: url }, "error"?: string }`.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use presign_core::constants::DEFAULT_HTTP_TIMEOUT_SECONDS;
use presign_core::error::{PresignError, ResolveError, Result};
use presign_core::traits::{BatchResolver, UrlMap};
use presign_core::types::ResourcePath;

/// Resolver configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Signing endpoint (e.g. "https://api.example.com/media/signed-urls")
    pub endpoint: String,
    /// Request timeout in seconds, enforced by the HTTP client
    pub timeout_seconds: u64,
}

impl ResolverConfig {
    /// Creates config for the given signing endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout_seconds: DEFAULT_HTTP_TIMEOUT_SECONDS,
        }
    }

    /// Overrides the request timeout.
    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    /// Checks that the endpoint is an absolute http(s) URL and the timeout is set.
    pub fn validate(&self) -> Result<()> {
        let parsed = url::Url::parse(&self.endpoint).map_err(|e| {
            PresignError::ConfigError(format!("invalid endpoint '{}': {}", self.endpoint, e))
        })?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(PresignError::ConfigError(format!(
                "endpoint must be http or https, got '{}'",
                parsed.scheme()
            )));
        }
        if self.timeout_seconds == 0 {
            return Err(PresignError::ConfigError("timeout_seconds must be > 0".into()));
        }
        Ok(())
    }
}

/// Batch resolver backed by an HTTP signing endpoint.
pub struct HttpBatchResolver {
    config: ResolverConfig,
    http_client: reqwest::Client,
}

impl HttpBatchResolver {
    /// Creates a resolver with the given config.
    pub fn with_config(config: ResolverConfig) -> Result<Self> {
        config.validate()?;

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| {
                PresignError::ConfigError(format!("failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Returns the configured endpoint.
    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }
}

#[async_trait]
impl BatchResolver for HttpBatchResolver {
    #[instrument(skip(self, paths), fields(paths = paths.len(), ttl_secs = ttl.as_secs()))]
    async fn resolve(
        &self,
        paths: &BTreeSet<ResourcePath>,
        ttl: Duration,
    ) -> std::result::Result<UrlMap, ResolveError> {
        if paths.is_empty() {
            return Ok(UrlMap::new());
        }

        let body = SignRequest {
            paths: paths.iter().map(ResourcePath::as_str).collect(),
            ttl_seconds: ttl.as_secs(),
        };

        let response = self
            .http_client
            .post(&self.config.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| ResolveError::transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let reason = serde_json::from_str::<SignResponse>(&text)
                .ok()
                .and_then(|r| r.error)
                .unwrap_or(text);
            return Err(ResolveError::rejected(format!("HTTP {}: {}", status, reason)));
        }

        let parsed: SignResponse = response
            .json()
            .await
            .map_err(|e| ResolveError::transport(format!("invalid response body: {}", e)))?;

        if !parsed.success {
            return Err(ResolveError::rejected(
                parsed.error.unwrap_or_else(|| "backend reported failure".into()),
            ));
        }

        let returned = parsed.urls.len();
        let urls: UrlMap = parsed
            .urls
            .into_iter()
            .map(|(path, url)| (ResourcePath::from(path), url))
            .filter(|(path, url)| paths.contains(path) && !url.is_empty())
            .collect();

        if urls.len() < returned {
            warn!(
                dropped = returned - urls.len(),
                "Ignoring unrequested or empty URLs in response"
            );
        }
        debug!(requested = paths.len(), resolved = urls.len(), "Batch resolved");

        Ok(urls)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignRequest<'a> {
    paths: Vec<&'a str>,
    ttl_seconds: u64,
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    success: bool,
    #[serde(default)]
    urls: HashMap<String, String>,
    #[serde(default)]
    error: Option<String>,
}
