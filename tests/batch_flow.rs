//! End-to-end engine tests over a scripted transport: partitioning, retry,
//! pagination resolution, and aggregation, without a real server.

use async_trait::async_trait;
use msgraph_batch::{
    BatchClient, BatchConfig, BatchOutput, BatchRequest, BatchTransport, EnvelopeRequest,
    OutputFormat, Result, SubResponse,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type CallLog = Arc<Mutex<Vec<Vec<EnvelopeRequest>>>>;
type Responder = Box<dyn Fn(usize, &[EnvelopeRequest]) -> Result<Vec<SubResponse>> + Send + Sync>;

/// Answers each batch call through a caller-supplied function and records
/// every envelope it was handed.
struct FnTransport {
    calls: CallLog,
    respond: Responder,
}

#[async_trait]
impl BatchTransport for FnTransport {
    async fn execute_batch(&self, requests: &[EnvelopeRequest]) -> Result<Vec<SubResponse>> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(requests.to_vec());
        let index = calls.len() - 1;
        drop(calls);
        (self.respond)(index, requests)
    }
}

fn client_with(
    config: BatchConfig,
    respond: impl Fn(usize, &[EnvelopeRequest]) -> Result<Vec<SubResponse>> + Send + Sync + 'static,
) -> (BatchClient, CallLog) {
    let calls: CallLog = Arc::default();
    let transport = FnTransport {
        calls: calls.clone(),
        respond: Box::new(respond),
    };
    (BatchClient::with_transport(transport, config), calls)
}

fn client(
    respond: impl Fn(usize, &[EnvelopeRequest]) -> Result<Vec<SubResponse>> + Send + Sync + 'static,
) -> (BatchClient, CallLog) {
    client_with(BatchConfig::new(), respond)
}

fn recorded(log: &CallLog) -> Vec<Vec<EnvelopeRequest>> {
    log.lock().unwrap().clone()
}

fn ok(id: &str, body: Value) -> SubResponse {
    SubResponse {
        id: id.into(),
        status: 200,
        body,
        headers: HashMap::new(),
    }
}

#[tokio::test]
async fn twenty_five_requests_fill_two_envelopes() {
    let (client, log) = client(|_, requests| {
        Ok(requests
            .iter()
            .map(|r| ok(&r.id, json!({"value": [r.id]})))
            .collect())
    });

    let requests: Vec<BatchRequest> = (0..25)
        .map(|i| BatchRequest::get(format!("r{i}"), format!("/users/{i}")))
        .collect();
    let results = client.execute_collect(requests).await.unwrap();

    let calls = recorded(&log);
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].len(), 20);
    assert_eq!(calls[1].len(), 5);

    assert_eq!(results.entries.len(), 25);
    for (i, entry) in results.entries.iter().enumerate() {
        assert_eq!(entry.id, format!("r{i}"), "entries follow submission order");
        assert_eq!(entry.status, 200);
        let value = &entry.response.as_ref().unwrap().value;
        assert_eq!(value, &vec![json!(entry.id)]);
    }
    assert_eq!(results.stats.http_calls, 2);
    assert_eq!(results.stats.sub_requests, 25);
    assert_eq!(results.stats.retries, 0);
}

#[tokio::test]
async fn continuation_page_items_append_in_arrival_order() {
    let (client, log) = client(|call, _| match call {
        0 => Ok(vec![ok(
            "r1",
            json!({
                "value": ["a", "b"],
                "@odata.nextLink": "https://graph.microsoft.com/v1.0/users?$skiptoken=p2"
            }),
        )]),
        _ => Ok(vec![ok("nl_0", json!({"value": ["c"]}))]),
    });

    let results = client
        .execute_collect(vec![BatchRequest::get("r1", "/users")])
        .await
        .unwrap();

    let calls = recorded(&log);
    assert_eq!(calls.len(), 2);
    let continuation = &calls[1][0];
    assert_eq!(continuation.id, "nl_0");
    assert_eq!(continuation.method, "GET");
    assert_eq!(continuation.url, "/users?$skiptoken=p2");

    assert_eq!(results.entries.len(), 1);
    let value = &results.entries[0].response.as_ref().unwrap().value;
    assert_eq!(value, &vec![json!("a"), json!("b"), json!("c")]);
}

#[tokio::test]
async fn pagination_fanout_keeps_origins_separate() {
    let (client, log) = client(|call, requests| match call {
        0 => Ok(vec![
            ok(
                "x",
                json!({
                    "value": ["x1"],
                    "@odata.nextLink": "https://graph.microsoft.com/v1.0/users?cursor=x2"
                }),
            ),
            ok(
                "y",
                json!({
                    "value": ["y1"],
                    "@odata.nextLink": "https://graph.microsoft.com/v1.0/groups?cursor=y2"
                }),
            ),
        ]),
        _ => Ok(requests
            .iter()
            .map(|r| {
                let item = if r.url.contains("cursor=x2") { "x2" } else { "y2" };
                ok(&r.id, json!({"value": [item]}))
            })
            .collect()),
    });

    let results = client
        .execute_collect(vec![
            BatchRequest::get("x", "/users"),
            BatchRequest::get("y", "/groups"),
        ])
        .await
        .unwrap();

    // Both links travel in one pagination round.
    let calls = recorded(&log);
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].len(), 2);

    let x = &results.entries[0];
    let y = &results.entries[1];
    assert_eq!(
        x.response.as_ref().unwrap().value,
        vec![json!("x1"), json!("x2")]
    );
    assert_eq!(
        y.response.as_ref().unwrap().value,
        vec![json!("y1"), json!("y2")]
    );
}

#[tokio::test(start_paused = true)]
async fn throttled_request_recovers_on_second_attempt() {
    let (client, log) = client(|call, _| match call {
        0 => Ok(vec![
            ok("steady", json!({"value": ["first"]})),
            SubResponse {
                id: "shaky".into(),
                status: 429,
                body: json!({"error": {"code": "tooManyRequests", "message": "slow down"}}),
                headers: HashMap::new(),
            },
        ]),
        _ => Ok(vec![ok("shaky", json!({"value": ["second"]}))]),
    });

    let results = client
        .execute_collect(vec![
            BatchRequest::get("steady", "/users"),
            BatchRequest::get("shaky", "/groups"),
        ])
        .await
        .unwrap();

    let calls = recorded(&log);
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].len(), 1);
    assert_eq!(calls[1][0].id, "shaky");

    assert!(results.entries.iter().all(|e| e.is_success()));
    assert_eq!(results.stats.retries, 1);
}

#[tokio::test]
async fn permanent_failures_pass_through_without_aborting() {
    let (client, _log) = client(|_, _| {
        Ok(vec![
            ok("good", json!({"value": [1]})),
            SubResponse {
                id: "bad".into(),
                status: 403,
                body: json!({"error": {"code": "accessDenied", "message": "nope"}}),
                headers: HashMap::new(),
            },
        ])
    });

    let results = client
        .execute_collect(vec![
            BatchRequest::get("good", "/users"),
            BatchRequest::get("bad", "/secrets"),
        ])
        .await
        .unwrap();

    assert_eq!(results.entries.len(), 2);
    assert!(results.entries[0].is_success());
    let bad = &results.entries[1];
    assert_eq!(bad.status, 403);
    assert_eq!(bad.error_code.as_deref(), Some("accessDenied"));
    assert_eq!(bad.error_message.as_deref(), Some("nope"));
    assert_eq!(results.failure_count(), 1);
}

#[tokio::test]
async fn failed_continuation_keeps_first_page_items() {
    let (client, _log) = client(|call, _| match call {
        0 => Ok(vec![ok(
            "r1",
            json!({
                "value": ["a"],
                "@odata.nextLink": "https://graph.microsoft.com/v1.0/users?page=2"
            }),
        )]),
        _ => Ok(vec![SubResponse {
            id: "nl_0".into(),
            status: 410,
            body: json!({"error": {"code": "gone", "message": "cursor expired"}}),
            headers: HashMap::new(),
        }]),
    });

    let results = client
        .execute_collect(vec![BatchRequest::get("r1", "/users")])
        .await
        .unwrap();

    // The lost page is treated as empty; first-page data survives.
    assert_eq!(results.entries.len(), 1);
    let entry = &results.entries[0];
    assert!(entry.is_success());
    assert_eq!(entry.response.as_ref().unwrap().value, vec![json!("a")]);
}

#[tokio::test]
async fn json_output_serializes_the_same_data() {
    let mut config = BatchConfig::new();
    config.output = OutputFormat::Json;
    let (client, _log) = client_with(config, |_, requests| {
        Ok(requests
            .iter()
            .map(|r| ok(&r.id, json!({"value": ["item"]})))
            .collect())
    });

    let output = client
        .execute(vec![BatchRequest::get("r1", "/users")])
        .await
        .unwrap();

    let BatchOutput::Json(document) = output else {
        panic!("expected JSON output");
    };
    let parsed: Value = serde_json::from_str(&document).unwrap();
    assert_eq!(parsed["entries"][0]["id"], "r1");
    assert_eq!(parsed["entries"][0]["response"]["value"][0], "item");
    assert_eq!(parsed["stats"]["http_calls"], 1);
}

#[tokio::test(start_paused = true)]
async fn group_delay_spaces_out_consecutive_groups() {
    let mut config = BatchConfig::new();
    config.group_delay = Some(Duration::from_secs(30));
    let (client, _log) = client_with(config, |_, requests| {
        Ok(requests.iter().map(|r| ok(&r.id, Value::Null)).collect())
    });

    let requests: Vec<BatchRequest> = (0..21)
        .map(|i| BatchRequest::get(format!("r{i}"), "/users"))
        .collect();

    let started = tokio::time::Instant::now();
    let results = client.execute_collect(requests).await.unwrap();
    assert!(started.elapsed() >= Duration::from_secs(30));
    assert_eq!(results.entries.len(), 21);
}
