//! Batch execution with bounded retry.
//!
//! Runs one group of sub-requests to a terminal outcome: each id either
//! succeeds, fails permanently, or exhausts its retries. The working set
//! shrinks every iteration to exactly the sub-requests that failed
//! transiently; a transport-level failure of the outer call aborts the whole
//! operation instead of being retried here.

use crate::transport::BatchTransport;
use crate::types::{BatchStats, EnvelopeRequest, ResultEntry, SubResponse};
use crate::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Statuses worth re-attempting after a delay.
pub(crate) fn is_transient(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Items and continuation token pulled from one successful sub-response.
#[derive(Debug)]
pub(crate) struct PageData {
    pub id: String,
    pub items: Vec<Value>,
    pub next_link: Option<String>,
}

#[derive(Debug, Default)]
pub(crate) struct GroupOutcome {
    pub successes: Vec<PageData>,
    pub failures: Vec<ResultEntry>,
}

enum Disposition {
    Done,
    Retry,
}

pub(crate) struct GroupExecutor<'a> {
    transport: &'a dyn BatchTransport,
    max_retries: u32,
}

impl<'a> GroupExecutor<'a> {
    pub(crate) fn new(transport: &'a dyn BatchTransport, max_retries: u32) -> Self {
        Self {
            transport,
            max_retries,
        }
    }

    /// Drive one group to completion or retry exhaustion.
    ///
    /// `max_retries` bounds the total number of attempts for the group; ids
    /// still pending when the bound is hit receive an explicit
    /// `retriesExhausted` failure entry rather than vanishing from the output.
    pub(crate) async fn run(
        &self,
        mut pending: Vec<EnvelopeRequest>,
        stats: &mut BatchStats,
    ) -> Result<GroupOutcome> {
        let mut outcome = GroupOutcome::default();
        let mut last_transient: HashMap<String, u16> = HashMap::new();
        let mut retry_count: u32 = 0;

        while !pending.is_empty() && retry_count < self.max_retries {
            stats.http_calls += 1;
            stats.sub_requests += pending.len() as u32;

            let responses = self.transport.execute_batch(&pending).await?;

            let mut disposition: HashMap<String, Disposition> = HashMap::new();
            for response in responses {
                if !pending.iter().any(|r| r.id == response.id) {
                    tracing::warn!(id = %response.id, "sub-response for unknown id, ignoring");
                    continue;
                }
                if is_success(response.status) {
                    let (items, next_link) = extract_page(&response.body);
                    outcome.successes.push(PageData {
                        id: response.id.clone(),
                        items,
                        next_link,
                    });
                    disposition.insert(response.id, Disposition::Done);
                } else if is_transient(response.status) {
                    stats.retries += 1;
                    let fresh_failure = last_transient
                        .insert(response.id.clone(), response.status)
                        .is_none();
                    let delay = retry_delay(&response, fresh_failure, retry_count);
                    tracing::warn!(
                        id = %response.id,
                        status = response.status,
                        delay_secs = delay.as_secs(),
                        "transient sub-response"
                    );
                    // No point sleeping when the retry bound is already hit.
                    if !delay.is_zero() && retry_count + 1 < self.max_retries {
                        tokio::time::sleep(delay).await;
                    }
                    disposition.insert(response.id, Disposition::Retry);
                } else {
                    let (code, message) = extract_error(&response.body);
                    tracing::warn!(
                        id = %response.id,
                        status = response.status,
                        code = %code,
                        "sub-request failed permanently"
                    );
                    outcome
                        .failures
                        .push(ResultEntry::failure(response.id.clone(), response.status, code, message));
                    disposition.insert(response.id, Disposition::Done);
                }
            }

            // Unanswered ids stay pending; everything marked Done drops out.
            pending.retain(|r| !matches!(disposition.get(&r.id), Some(Disposition::Done)));
            retry_count += 1;
        }

        for request in pending {
            let status = last_transient.get(&request.id).copied().unwrap_or(0);
            tracing::warn!(id = %request.id, status, "retries exhausted");
            outcome.failures.push(ResultEntry::failure(
                request.id,
                status,
                "retriesExhausted",
                format!("no successful response after {} attempts", self.max_retries),
            ));
        }

        Ok(outcome)
    }
}

/// Delay before the next attempt: a structured Retry-After wins; otherwise
/// exponential backoff on the iteration count, except that a request's very
/// first transient failure retries immediately.
fn retry_delay(response: &SubResponse, fresh_failure: bool, retry_count: u32) -> Duration {
    if let Some(secs) = response.retry_after_secs() {
        return Duration::from_secs(secs);
    }
    if fresh_failure {
        Duration::ZERO
    } else {
        Duration::from_secs(1u64 << retry_count.min(16))
    }
}

/// Pull the item collection and continuation token out of a success body.
///
/// A collection body carries a `value` array; a single-entity body counts as
/// one item; an empty body (204-style) yields no items.
fn extract_page(body: &Value) -> (Vec<Value>, Option<String>) {
    let next_link = body
        .get("@odata.nextLink")
        .and_then(Value::as_str)
        .map(str::to_string);
    let items = match body.get("value").and_then(Value::as_array) {
        Some(values) => values.clone(),
        None if body.is_null() => Vec::new(),
        None => vec![body.clone()],
    };
    (items, next_link)
}

/// Extract the OData error code and message from a failure body.
fn extract_error(body: &Value) -> (String, String) {
    let code = body
        .pointer("/error/code")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    let message = body
        .pointer("/error/message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| {
            if body.is_null() {
                "no error body".to_string()
            } else {
                body.to_string()
            }
        });
    (code, message)
}
