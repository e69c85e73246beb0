//! HTTP transport for the batch endpoint.
//!
//! The engine talks to the wire through [`BatchTransport`] so tests can script
//! sub-responses without a server; [`HttpTransport`] is the reqwest-backed
//! implementation used in production.

use crate::types::{EnvelopeRequest, RequestEnvelope, ResponseEnvelope, SubResponse};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::Proxy;
use std::time::Duration;

/// Endpoint version selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApiVersion {
    #[default]
    V1,
    Beta,
}

impl ApiVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiVersion::V1 => "v1.0",
            ApiVersion::Beta => "beta",
        }
    }
}

const DEFAULT_HOST: &str = "https://graph.microsoft.com";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// One batched HTTP exchange: an envelope of sub-requests in, the correlated
/// sub-responses out.
///
/// A transport error here (connection failure, non-2xx on the outer call) is
/// fatal for the whole operation; per-sub-request failures come back as
/// ordinary [`SubResponse`] values and are classified by the executor.
#[async_trait]
pub trait BatchTransport: Send + Sync {
    async fn execute_batch(&self, requests: &[EnvelopeRequest]) -> Result<Vec<SubResponse>>;
}

/// reqwest-backed transport posting to `{base_url}/$batch` with bearer auth.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl HttpTransport {
    pub fn new(access_token: impl Into<String>, version: ApiVersion) -> Result<Self> {
        Self::builder(access_token).version(version).build()
    }

    pub fn builder(access_token: impl Into<String>) -> HttpTransportBuilder {
        HttpTransportBuilder {
            access_token: access_token.into(),
            version: ApiVersion::default(),
            host: None,
            proxy: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Version-prefixed endpoint root, e.g. `https://graph.microsoft.com/v1.0`.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

pub struct HttpTransportBuilder {
    access_token: String,
    version: ApiVersion,
    host: Option<String>,
    proxy: Option<String>,
    timeout: Duration,
}

impl HttpTransportBuilder {
    pub fn version(mut self, version: ApiVersion) -> Self {
        self.version = version;
        self
    }

    /// Override the endpoint host, e.g. for sovereign clouds or tests.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Route all outbound calls through the given proxy URL.
    pub fn proxy(mut self, proxy_url: impl Into<String>) -> Self {
        self.proxy = Some(proxy_url.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<HttpTransport> {
        let mut builder = reqwest::Client::builder().timeout(self.timeout);
        if let Some(proxy_url) = &self.proxy {
            let proxy = Proxy::all(proxy_url)
                .map_err(|e| Error::configuration(format!("invalid proxy URL: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let client = builder.build()?;

        let host = self
            .host
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let host = host.trim_end_matches('/');
        Ok(HttpTransport {
            client,
            base_url: format!("{host}/{}", self.version.as_str()),
            access_token: self.access_token,
        })
    }
}

#[async_trait]
impl BatchTransport for HttpTransport {
    async fn execute_batch(&self, requests: &[EnvelopeRequest]) -> Result<Vec<SubResponse>> {
        let url = format!("{}/$batch", self.base_url);
        let envelope = RequestEnvelope { requests };

        tracing::debug!(sub_requests = requests.len(), %url, "issuing batch call");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&envelope)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Endpoint {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: ResponseEnvelope = response.json().await?;
        Ok(envelope.responses)
    }
}
