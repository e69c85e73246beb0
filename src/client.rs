//! Caller-facing batch client.
//!
//! One entry point: hand it an access token and an ordered request list, get
//! back one [`ResultEntry`] per request id with pagination already resolved.
//! Groups are issued strictly sequentially, one HTTP call in flight at a time.

use crate::executor::GroupExecutor;
use crate::pagination::PaginationResolver;
use crate::partition::partition;
use crate::query::merge_query_params;
use crate::transport::{ApiVersion, BatchTransport, HttpTransport};
use crate::types::{
    BatchOutput, BatchRequest, BatchResults, BatchStats, ContinuationLink, EnvelopeRequest,
    OutputFormat, ResultEntry,
};
use crate::{Error, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Engine knobs; everything has a workable default.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Maximum attempts per group before remaining ids get a
    /// `retriesExhausted` entry.
    pub max_retries: u32,
    /// Applied to every request that does not define the key itself.
    pub global_query_params: Option<HashMap<String, String>>,
    /// Pause between consecutive groups, purely to reduce sustained rate.
    pub group_delay: Option<Duration>,
    pub output: OutputFormat,
}

impl BatchConfig {
    pub const DEFAULT_MAX_RETRIES: u32 = 5;

    pub fn new() -> Self {
        Self {
            max_retries: Self::DEFAULT_MAX_RETRIES,
            global_query_params: None,
            group_delay: None,
            output: OutputFormat::Structured,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`BatchClient`] over the real HTTP transport.
pub struct BatchClientBuilder {
    access_token: String,
    version: ApiVersion,
    host: Option<String>,
    proxy: Option<String>,
    config: BatchConfig,
}

impl BatchClientBuilder {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            version: ApiVersion::default(),
            host: None,
            proxy: None,
            config: BatchConfig::new(),
        }
    }

    /// Select the beta or stable endpoint version.
    pub fn version(mut self, version: ApiVersion) -> Self {
        self.version = version;
        self
    }

    /// Override the endpoint host (sovereign clouds, tests).
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Route outbound calls through the given proxy.
    pub fn proxy(mut self, proxy_url: impl Into<String>) -> Self {
        self.proxy = Some(proxy_url.into());
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    pub fn global_query_params(mut self, params: HashMap<String, String>) -> Self {
        self.config.global_query_params = Some(params);
        self
    }

    pub fn group_delay(mut self, delay: Duration) -> Self {
        self.config.group_delay = Some(delay);
        self
    }

    pub fn output(mut self, output: OutputFormat) -> Self {
        self.config.output = output;
        self
    }

    pub fn build(self) -> Result<BatchClient> {
        if self.config.max_retries == 0 {
            return Err(Error::configuration("max_retries must be at least 1"));
        }
        let mut transport = HttpTransport::builder(self.access_token).version(self.version);
        if let Some(host) = self.host {
            transport = transport.host(host);
        }
        if let Some(proxy) = self.proxy {
            transport = transport.proxy(proxy);
        }
        Ok(BatchClient {
            transport: Box::new(transport.build()?),
            config: self.config,
        })
    }
}

pub struct BatchClient {
    transport: Box<dyn BatchTransport>,
    config: BatchConfig,
}

impl BatchClient {
    pub fn builder(access_token: impl Into<String>) -> BatchClientBuilder {
        BatchClientBuilder::new(access_token)
    }

    /// Build a client over any transport, typically a scripted one in tests.
    pub fn with_transport(transport: impl BatchTransport + 'static, config: BatchConfig) -> Self {
        Self {
            transport: Box::new(transport),
            config,
        }
    }

    /// Execute the request list and shape the output per the configured
    /// format. The format switch has no effect on the data itself.
    pub async fn execute(&self, requests: Vec<BatchRequest>) -> Result<BatchOutput> {
        let results = self.execute_collect(requests).await?;
        match self.config.output {
            OutputFormat::Structured => Ok(BatchOutput::Structured(results)),
            OutputFormat::Json => Ok(BatchOutput::Json(results.to_json()?)),
        }
    }

    /// Execute the request list to a structured result set: exactly one entry
    /// per submitted id, in submission order, with every continuation page
    /// folded in.
    pub async fn execute_collect(&self, requests: Vec<BatchRequest>) -> Result<BatchResults> {
        if requests.is_empty() {
            return Err(Error::EmptyBatch);
        }

        let order: Vec<String> = requests.iter().map(|r| r.id.clone()).collect();
        let mut stats = BatchStats::default();
        let mut pages: HashMap<String, Vec<Value>> = HashMap::new();
        let mut failures: HashMap<String, ResultEntry> = HashMap::new();
        let mut links: Vec<ContinuationLink> = Vec::new();

        let executor = GroupExecutor::new(self.transport.as_ref(), self.config.max_retries);
        let groups: Vec<&[BatchRequest]> = partition(&requests).collect();
        let group_count = groups.len();

        for (index, group) in groups.into_iter().enumerate() {
            tracing::debug!(
                group = index + 1,
                of = group_count,
                size = group.len(),
                "executing batch group"
            );
            let envelope: Vec<EnvelopeRequest> =
                group.iter().map(|r| self.to_envelope(r)).collect();
            let outcome = executor.run(envelope, &mut stats).await?;

            for page in outcome.successes {
                if let Some(next) = page.next_link {
                    links.push(ContinuationLink {
                        origin_id: page.id.clone(),
                        url: next,
                    });
                }
                pages.entry(page.id).or_default().extend(page.items);
            }
            for failure in outcome.failures {
                failures.insert(failure.id.clone(), failure);
            }

            if let Some(delay) = self.config.group_delay {
                if index + 1 < group_count {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        PaginationResolver::new(self.transport.as_ref(), self.config.max_retries)
            .resolve(links, &mut pages, &mut stats)
            .await?;

        let mut entries = Vec::with_capacity(order.len());
        for id in order {
            if let Some(failure) = failures.remove(&id) {
                entries.push(failure);
            } else if let Some(items) = pages.remove(&id) {
                entries.push(ResultEntry::success(id, items));
            } else {
                // Executor guarantees a terminal outcome per id; this covers
                // an endpoint that drops an id without ever answering it.
                entries.push(ResultEntry::failure(
                    id,
                    0,
                    "noResponse",
                    "endpoint returned no response for this id",
                ));
            }
        }

        let results = BatchResults { entries, stats };
        tracing::info!(
            entries = results.entries.len(),
            failures = results.failure_count(),
            http_calls = stats.http_calls,
            sub_requests = stats.sub_requests,
            retries = stats.retries,
            "batch operation complete"
        );
        Ok(results)
    }

    /// Resolve the final URL once; retries resend this envelope unchanged, so
    /// parameters are never merged twice.
    fn to_envelope(&self, request: &BatchRequest) -> EnvelopeRequest {
        let url = merge_query_params(
            &request.url,
            request.query_params.as_ref(),
            self.config.global_query_params.as_ref(),
        );
        EnvelopeRequest {
            id: request.id.clone(),
            method: request.method.clone(),
            url,
            body: request.body.clone(),
            headers: request.headers.clone(),
        }
    }
}
