// # HTTP Health Probe
//
// This crate checks hdns API availability over plain HTTP.
//
// ## Architecture
//
// `GET {api}/info` answers `{"status": <database connected>}`. Any 2xx
// answer means the API is reachable; a disconnected database is logged but
// does not count as an outage, since streams still work.

use async_trait::async_trait;
use hdns_core::endpoint::{ApiEndpoint, INFO_RESOURCE};
use hdns_core::model::ApiInfo;
use hdns_core::{Error, HealthProbe, Result};
use std::time::Duration;
use tracing::{debug, warn};

/// Default request timeout
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Probes `{api}/info`
pub struct HttpHealthProbe {
    /// Fully resolved info URL
    url: reqwest::Url,

    /// HTTP client
    client: reqwest::Client,
}

impl HttpHealthProbe {
    /// Create a probe for the API at `endpoint`
    pub fn new(endpoint: &ApiEndpoint) -> Result<Self> {
        Self::with_timeout(endpoint, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create with a custom request timeout
    pub fn with_timeout(endpoint: &ApiEndpoint, timeout: Duration) -> Result<Self> {
        let url = endpoint.http_url(INFO_RESOURCE)?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { url, client })
    }

    pub fn url(&self) -> &reqwest::Url {
        &self.url
    }

    /// Fetch and decode the info resource
    pub async fn info(&self) -> Result<ApiInfo> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| Error::probe(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::probe(format!("HTTP error: {}", response.status())));
        }

        response
            .json::<ApiInfo>()
            .await
            .map_err(|e| Error::probe(format!("Invalid info response: {}", e)))
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self) -> Result<()> {
        let info = self.info().await?;
        if info.status {
            debug!(url = %self.url, "API reachable");
        } else {
            warn!(url = %self.url, "API reachable but its database is disconnected");
        }
        Ok(())
    }
}
