// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use billing::Hostname;
use billing_agent::agent;
use billing_agent::config::AgentConfig;
use mockito::{Matcher, Server};
use std::io::Write;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn agent_meters_inventory_and_flushes_on_shutdown() {
    let mut server = Server::new_async().await;
    let runner_address = server.host_with_port();
    let network = server
        .mock("GET", "/network_usage")
        .with_status(200)
        .with_body(r#"{"ingress_bytes": 2048, "egress_bytes": 512}"#)
        .expect_at_least(2)
        .create_async()
        .await;
    let usage_events = server
        .mock("POST", "/usage_events")
        .match_body(Matcher::Regex(
            r#""metric":"effective_compute_seconds".*"endpoint_id":"ep-1""#.to_string(),
        ))
        .with_status(200)
        .expect_at_least(1)
        .create_async()
        .await;

    let mut inventory = tempfile::NamedTempFile::new().unwrap();
    write!(
        inventory,
        r#"[{{"uid":"w-1","name":"compute-1","endpointId":"ep-1","phase":"Running","cpusMilli":1000,"runnerAddress":"{runner_address}"}}]"#
    )
    .unwrap();

    let config = AgentConfig::from_json(&format!(
        r#"{{
            "billing": {{
                "cpuMetricName": "effective_compute_seconds",
                "activeTimeMetricName": "active_time_seconds",
                "ingressBytesMetricName": "proxy_io_bytes_per_client",
                "egressBytesMetricName": "egress_bytes",
                "collectEverySeconds": 1,
                "accumulateEverySeconds": 60,
                "clients": {{
                    "http": {{
                        "url": "{}",
                        "pushEverySeconds": 60,
                        "pushRequestTimeoutSeconds": 2,
                        "maxBatchSize": 100
                    }}
                }}
            }},
            "inventoryPath": {:?},
            "shutdownTimeoutSeconds": 5
        }}"#,
        server.url(),
        inventory.path()
    ))
    .unwrap();

    let shutdown = CancellationToken::new();
    let agent = tokio::spawn(agent::run(
        config,
        Hostname::new("node-a"),
        shutdown.clone(),
    ));

    tokio::time::sleep(Duration::from_millis(2500)).await;
    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(10), agent)
        .await
        .expect("agent did not stop")
        .expect("agent panicked")
        .expect("agent failed");

    network.assert_async().await;
    usage_events.assert_async().await;
}

#[tokio::test]
async fn agent_without_billing_waits_for_shutdown() {
    let config = AgentConfig::from_json(r#"{"inventoryPath": "/nonexistent"}"#).unwrap();
    let shutdown = CancellationToken::new();
    let agent = tokio::spawn(agent::run(
        config,
        Hostname::new("node-a"),
        shutdown.clone(),
    ));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!agent.is_finished());
    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), agent)
        .await
        .expect("agent did not stop")
        .expect("agent panicked")
        .expect("agent failed");
}
