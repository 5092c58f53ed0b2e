use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::config::SourcesConfig;
use crate::error::{EngineError, EngineResult};
use crate::sources::{parse_records, ProfileSource};
use crate::types::{NoticeProfile, OrganizationProfile};

const USER_AGENT: &str = concat!("bid-oracle/", env!("CARGO_PKG_VERSION"));

/// Profiles served as JSON over HTTP. The client is owned by the source so
/// timeouts follow its configuration.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
    notices_url: String,
    organizations_url: String,
}

impl HttpSource {
    pub fn from_config(config: &SourcesConfig) -> EngineResult<Self> {
        if config.notices_url.trim().is_empty() || config.organizations_url.trim().is_empty() {
            return Err(EngineError::invalid(
                "sources.notices_url and sources.organizations_url must both be set",
            ));
        }
        Ok(Self {
            client: build_client(config)?,
            notices_url: config.notices_url.clone(),
            organizations_url: config.organizations_url.clone(),
        })
    }

    pub async fn fetch_json(&self, url: &str) -> EngineResult<Value> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| EngineError::transient(format!("GET {url} failed: {e}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| EngineError::transient(format!("failed reading body from {url}: {e}")))?;
        if !status.is_success() {
            let preview: String = body.chars().take(180).collect();
            let message = format!("GET {url} returned {status}: {preview}");
            return Err(classify_status(status, message));
        }
        debug!(url, bytes = body.len(), "profile payload received");
        serde_json::from_str(&body)
            .map_err(|e| EngineError::invalid(format!("invalid JSON response from {url}: {e}")))
    }
}

/// A client that cannot be built is a configuration problem; retrying it
/// would fail the same way.
fn build_client(config: &SourcesConfig) -> EngineResult<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .build()
        .map_err(|e| EngineError::invalid(format!("failed building HTTP client: {e}")))
}

/// Server-side trouble and throttling are worth retrying; other client
/// errors will not fix themselves.
fn classify_status(status: StatusCode, message: String) -> EngineError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        EngineError::TransientExternal(message)
    } else {
        EngineError::InvalidInput(message)
    }
}

#[async_trait]
impl ProfileSource for HttpSource {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch_notices(&self) -> EngineResult<Vec<NoticeProfile>> {
        parse_records(self.fetch_json(&self.notices_url).await?)
    }

    async fn fetch_organizations(&self) -> EngineResult<Vec<OrganizationProfile>> {
        parse_records(self.fetch_json(&self.organizations_url).await?)
    }
}
