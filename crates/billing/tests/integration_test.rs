// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use billing::{enrich, http::HttpSink, send, Hostname, IncrementalEvent, SendError, TraceId};
use chrono::{TimeZone, Utc};
use mockito::{Matcher, Server};
use std::time::Duration;

fn events() -> Vec<IncrementalEvent> {
    let start = Utc.with_ymd_and_hms(2024, 4, 12, 7, 0, 0).unwrap();
    let stop = Utc.with_ymd_and_hms(2024, 4, 12, 7, 0, 30).unwrap();
    let hostname = Hostname::new("node-a");

    ["effective_compute_seconds", "active_time_seconds"]
        .iter()
        .enumerate()
        .map(|(i, metric)| {
            enrich(
                stop,
                &hostname,
                i + 1,
                2,
                IncrementalEvent {
                    metric_name: metric.to_string(),
                    event_type: String::new(),
                    idempotency_key: String::new(),
                    endpoint_id: "ep-1".to_string(),
                    start_time: start,
                    stop_time: stop,
                    value: 30,
                },
            )
        })
        .collect()
}

#[tokio::test]
async fn http_sink_ships_enriched_batch() {
    let mut server = Server::new_async().await;
    let trace_id = TraceId::generate();

    let mock = server
        .mock("POST", "/usage_events")
        .match_header("x-trace-id", trace_id.as_str())
        .match_body(Matcher::Json(serde_json::json!({
            "events": [
                {
                    "metric": "effective_compute_seconds",
                    "type": "incremental",
                    "idempotency_key": "2024-04-12T07:00:30.000000Z-node-a-1/2",
                    "endpoint_id": "ep-1",
                    "start_time": "2024-04-12T07:00:00.000000Z",
                    "stop_time": "2024-04-12T07:00:30.000000Z",
                    "value": 30,
                },
                {
                    "metric": "active_time_seconds",
                    "type": "incremental",
                    "idempotency_key": "2024-04-12T07:00:30.000000Z-node-a-2/2",
                    "endpoint_id": "ep-1",
                    "start_time": "2024-04-12T07:00:00.000000Z",
                    "stop_time": "2024-04-12T07:00:30.000000Z",
                    "value": 30,
                },
            ]
        })))
        .with_status(200)
        .create_async()
        .await;

    let sink = HttpSink::new(&server.url(), Duration::from_secs(5)).expect("failed to build sink");

    send(&sink, &trace_id, &events())
        .await
        .expect("send failed");

    mock.assert_async().await;
}

#[tokio::test]
async fn http_sink_is_not_retried_on_server_error() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/usage_events")
        .with_status(500)
        .with_body("Internal Server Error")
        .expect(1)
        .create_async()
        .await;

    let sink = HttpSink::new(&server.url(), Duration::from_secs(5)).expect("failed to build sink");

    let result = send(&sink, &TraceId::generate(), &events()).await;

    assert!(matches!(result, Err(SendError::UnexpectedStatusCode(_))));
    mock.assert_async().await;
}
