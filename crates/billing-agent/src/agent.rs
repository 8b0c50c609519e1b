// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wires the collaborators, the collector and one sender per sink together.

use billing::http::HttpSink;
use billing::s3::S3Sink;
use billing::{Hostname, Sink};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::collector::Collector;
use crate::config::{AgentConfig, ClientsConfig, PushConfig};
use crate::emitter::MetricNames;
use crate::error::AgentError;
use crate::metrics::PromMetrics;
use crate::metrics_server::MetricsServer;
use crate::queue::new_event_queue;
use crate::sample::HttpNetworkUsageSource;
use crate::sender::EventSender;
use crate::store::{InventoryFileStore, WorkloadStore};

/// A configured sink with the settings of its sender.
pub struct Client {
    pub name: &'static str,
    pub sink: Arc<dyn Sink>,
    pub push: PushConfig,
}

/// Builds every sink enabled in `clients`.
pub async fn build_clients(clients: &ClientsConfig) -> Result<Vec<Client>, AgentError> {
    let mut built = Vec::new();

    if let Some(http) = &clients.http {
        let sink = HttpSink::new(&http.url, http.push.push_request_timeout())?;
        built.push(Client {
            name: "http",
            sink: Arc::new(sink),
            push: http.push.clone(),
        });
    }

    if let Some(s3) = &clients.s3 {
        let sink = S3Sink::new(s3.sink.clone(), Arc::new(Utc::now)).await;
        built.push(Client {
            name: "s3",
            sink: Arc::new(sink),
            push: s3.push.clone(),
        });
    }

    Ok(built)
}

/// Runs the agent until `shutdown` fires.
///
/// The collector runs on the calling task. Once it has drained its final window the senders are
/// told to flush their queues, and are given `shutdownTimeoutSeconds` to do so.
pub async fn run(
    config: AgentConfig,
    hostname: Hostname,
    shutdown: CancellationToken,
) -> Result<(), AgentError> {
    let metrics = PromMetrics::new()?;

    let mut background = JoinSet::new();
    if config.metrics_port != 0 {
        let server = MetricsServer::bind(config.metrics_port, metrics.clone())
            .await
            .map_err(AgentError::MetricsServer)?;
        background.spawn(server.serve(shutdown.clone()));
    }

    let Some(billing) = &config.billing else {
        info!("Billing is disabled, only serving metrics");
        shutdown.cancelled().await;
        background.join_all().await;
        return Ok(());
    };

    let source = Arc::new(HttpNetworkUsageSource::new(Duration::from_secs(
        config.sample_request_timeout_seconds,
    ))?);
    let clients = build_clients(&billing.clients).await?;
    if clients.is_empty() {
        warn!("No billing clients configured, usage events will be discarded");
    }

    let store = Arc::new(InventoryFileStore::new(&config.inventory_path));
    store.refresh().await;
    {
        let store = Arc::clone(&store);
        let refresh_every = Duration::from_secs(config.inventory_refresh_seconds);
        let cancel = shutdown.clone();
        background.spawn(async move { store.run(refresh_every, cancel).await });
    }

    let collector_finished = CancellationToken::new();
    let mut senders = JoinSet::new();
    let mut writers = Vec::with_capacity(clients.len());
    for client in clients {
        let client_metrics = metrics.for_client(client.name);
        let (writer, reader) = new_event_queue(
            client.push.queue_capacity,
            client_metrics.queue_size.clone(),
            client_metrics.queue_dropped.clone(),
        );
        writers.push(writer);

        let sender = EventSender::new(
            client.name,
            client.sink,
            client.push,
            client_metrics,
            reader,
            collector_finished.clone(),
        );
        senders.spawn(sender.run());
    }

    let collector = Collector::new(
        Arc::clone(&store) as Arc<dyn WorkloadStore>,
        source,
        metrics,
        MetricNames::from(billing),
        hostname,
        writers,
        Utc::now(),
    );
    collector
        .run(
            billing.collect_every(),
            billing.accumulate_every(),
            shutdown.clone(),
        )
        .await;

    collector_finished.cancel();
    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_seconds);
    let flushed = tokio::time::timeout(shutdown_timeout, async {
        while let Some(finished) = senders.join_next().await {
            if let Err(e) = finished {
                error!("Billing sender failed: {:?}", e);
            }
        }
    })
    .await;
    if flushed.is_err() {
        warn!(
            "Billing senders did not finish within {:?}, abandoning their queues",
            shutdown_timeout
        );
        senders.shutdown().await;
    }

    background.join_all().await;
    info!("Billing agent stopped");
    Ok(())
}
