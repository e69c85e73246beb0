//! Core type definitions: caller-facing requests, wire envelopes, and results.
//!
//! The wire contract follows the Graph `$batch` shape: the request envelope is
//! `{"requests": [{id, method, url, body?, headers?}, ...]}` with at most 20
//! entries, and the response envelope is `{"responses": [{id, status, body,
//! headers?}, ...]}` in arbitrary order, correlated by id rather than position.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// One logical operation submitted by the caller.
///
/// The `id` is caller-assigned and must be unique within one call; every id
/// submitted yields exactly one [`ResultEntry`] in the final output.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub id: String,
    pub method: String,
    /// Relative path against the endpoint version root, e.g. `/users`.
    pub url: String,
    pub body: Option<Value>,
    pub headers: Option<HashMap<String, String>>,
    pub query_params: Option<HashMap<String, String>>,
}

impl BatchRequest {
    pub fn new(id: impl Into<String>, method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            url: url.into(),
            body: None,
            headers: None,
            query_params: None,
        }
    }

    /// Convenience constructor for the common GET case.
    pub fn get(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(id, "GET", url)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn with_query_params(mut self, params: HashMap<String, String>) -> Self {
        self.query_params = Some(params);
        self
    }
}

/// One sub-request as it appears inside the batch envelope.
///
/// Built from a [`BatchRequest`] after query-parameter merging; the `url` here
/// is final and is never re-merged on retry.
#[derive(Debug, Clone, Serialize)]
pub struct EnvelopeRequest {
    pub id: String,
    pub method: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
}

/// Outgoing wire envelope.
#[derive(Debug, Serialize)]
pub(crate) struct RequestEnvelope<'a> {
    pub requests: &'a [EnvelopeRequest],
}

/// Incoming wire envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct ResponseEnvelope {
    pub responses: Vec<SubResponse>,
}

/// One sub-response from the batch envelope, correlated to its request by id.
#[derive(Debug, Clone, Deserialize)]
pub struct SubResponse {
    pub id: String,
    pub status: u16,
    #[serde(default)]
    pub body: Value,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl SubResponse {
    /// Structured retry-delay hint, taken from a real `Retry-After` header on
    /// the sub-response. Free-text hints in error messages are deliberately
    /// not parsed.
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("retry-after"))
            .and_then(|(_, v)| v.trim().parse().ok())
    }
}

/// A deferred fetch for one page boundary.
///
/// `origin_id` always traces back to the caller-assigned request id, never to
/// a synthetic pagination-batch id.
#[derive(Debug, Clone)]
pub struct ContinuationLink {
    pub origin_id: String,
    pub url: String,
}

/// Accumulated pages for one successful id.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseData {
    pub value: Vec<Value>,
}

/// Terminal output unit, one per submitted request id.
#[derive(Debug, Clone, Serialize)]
pub struct ResultEntry {
    pub id: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseData>,
    #[serde(rename = "errorCode", skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(rename = "errorMessage", skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ResultEntry {
    pub fn success(id: impl Into<String>, value: Vec<Value>) -> Self {
        Self {
            id: id.into(),
            status: 200,
            response: Some(ResponseData { value }),
            error_code: None,
            error_message: None,
        }
    }

    pub fn failure(
        id: impl Into<String>,
        status: u16,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            status,
            response: None,
            error_code: Some(code.into()),
            error_message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.response.is_some()
    }
}

/// Call statistics returned alongside the result set.
///
/// These are plain values handed back with the entries, not shared counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BatchStats {
    /// Outer HTTP calls issued, including retry iterations and pagination rounds.
    pub http_calls: u32,
    /// Sub-requests carried across all envelopes, retransmissions included.
    pub sub_requests: u32,
    /// Transient sub-response occurrences that triggered a re-attempt.
    pub retries: u32,
}

/// The complete outcome of one batched operation.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResults {
    pub entries: Vec<ResultEntry>,
    pub stats: BatchStats,
}

impl BatchResults {
    /// Serialize the full result set to a single JSON document.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn failure_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_success()).count()
    }
}

/// Caller-selected output shape; has no effect on the data itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Structured,
    Json,
}

/// Final return value of [`crate::BatchClient::execute`].
#[derive(Debug, Clone)]
pub enum BatchOutput {
    Structured(BatchResults),
    Json(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_request_omits_absent_fields() {
        let req = EnvelopeRequest {
            id: "1".into(),
            method: "GET".into(),
            url: "/users".into(),
            body: None,
            headers: None,
        };
        let wire = serde_json::to_value(&req).unwrap();
        assert_eq!(wire, json!({"id": "1", "method": "GET", "url": "/users"}));
    }

    #[test]
    fn sub_response_defaults_missing_body_and_headers() {
        let resp: SubResponse = serde_json::from_value(json!({"id": "1", "status": 204})).unwrap();
        assert_eq!(resp.status, 204);
        assert!(resp.body.is_null());
        assert!(resp.headers.is_empty());
    }

    #[test]
    fn retry_after_is_case_insensitive() {
        let resp: SubResponse = serde_json::from_value(json!({
            "id": "1",
            "status": 429,
            "headers": {"retry-after": "7"}
        }))
        .unwrap();
        assert_eq!(resp.retry_after_secs(), Some(7));
    }

    #[test]
    fn result_entry_serializes_error_fields_in_camel_case() {
        let entry = ResultEntry::failure("r1", 404, "itemNotFound", "no such user");
        let wire = serde_json::to_value(&entry).unwrap();
        assert_eq!(wire["errorCode"], "itemNotFound");
        assert_eq!(wire["errorMessage"], "no such user");
        assert!(wire.get("response").is_none());
    }
}
