//! Server-driven pagination resolution.
//!
//! Continuation links are themselves batched: each round takes up to 20
//! pending links, assigns synthetic per-call ids (`nl_<index>`), and maps them
//! back to the originating request id through a side table scoped to that
//! round. Rounds repeat until no link remains; the bound is the remote data's
//! actual size, there is no independent round ceiling.

use crate::executor::GroupExecutor;
use crate::partition::MAX_BATCH_SIZE;
use crate::transport::BatchTransport;
use crate::types::{BatchStats, ContinuationLink, EnvelopeRequest};
use crate::Result;
use serde_json::Value;
use std::collections::HashMap;
use url::Url;

pub(crate) struct PaginationResolver<'a> {
    transport: &'a dyn BatchTransport,
    max_retries: u32,
}

impl<'a> PaginationResolver<'a> {
    pub(crate) fn new(transport: &'a dyn BatchTransport, max_retries: u32) -> Self {
        Self {
            transport,
            max_retries,
        }
    }

    /// Fetch every pending page and fold its items into the owning origin id's
    /// accumulator, enqueueing further links as they appear.
    ///
    /// A continuation fetch that fails (permanently or by exhausting retries)
    /// is logged and its page treated as empty; partial data for that id is
    /// preferred over failing its whole aggregation.
    pub(crate) async fn resolve(
        &self,
        mut links: Vec<ContinuationLink>,
        pages: &mut HashMap<String, Vec<Value>>,
        stats: &mut BatchStats,
    ) -> Result<()> {
        while !links.is_empty() {
            let take = links.len().min(MAX_BATCH_SIZE);
            let round: Vec<ContinuationLink> = links.drain(..take).collect();

            let mut origin_of: HashMap<String, String> = HashMap::new();
            let mut requests = Vec::with_capacity(round.len());
            for (index, link) in round.into_iter().enumerate() {
                let synthetic = format!("nl_{index}");
                requests.push(EnvelopeRequest {
                    id: synthetic.clone(),
                    method: "GET".into(),
                    url: relative_url(&link.url),
                    body: None,
                    headers: None,
                });
                origin_of.insert(synthetic, link.origin_id);
            }

            tracing::debug!(
                links = requests.len(),
                remaining = links.len(),
                "resolving continuation round"
            );

            let executor = GroupExecutor::new(self.transport, self.max_retries);
            let outcome = executor.run(requests, stats).await?;

            for page in outcome.successes {
                let Some(origin) = origin_of.get(&page.id) else {
                    continue;
                };
                pages.entry(origin.clone()).or_default().extend(page.items);
                if let Some(next) = page.next_link {
                    links.push(ContinuationLink {
                        origin_id: origin.clone(),
                        url: next,
                    });
                }
            }
            for failure in outcome.failures {
                let origin = origin_of
                    .get(&failure.id)
                    .map(String::as_str)
                    .unwrap_or("<unknown>");
                tracing::warn!(
                    origin_id = %origin,
                    status = failure.status,
                    "continuation fetch failed, treating page as empty"
                );
            }
        }
        Ok(())
    }
}

/// Rewrite an absolute continuation URL to the path the batch envelope
/// expects: host stripped, version prefix (`/v1.0` or `/beta`) removed, query
/// preserved. Already-relative links pass through unchanged.
pub(crate) fn relative_url(link: &str) -> String {
    let Ok(parsed) = Url::parse(link) else {
        return link.to_string();
    };
    let mut path = parsed.path().to_string();
    for version in ["/v1.0/", "/beta/"] {
        if let Some(rest) = path.strip_prefix(version) {
            path = format!("/{rest}");
            break;
        }
    }
    match parsed.query() {
        Some(query) => format!("{path}?{query}"),
        None => path,
    }
}
