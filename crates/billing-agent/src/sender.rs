// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Drains one sink's queue on that sink's own push cadence.
//!
//! Batches are delivered at most once. A batch that fails is logged, counted and dropped; the
//! events still queued wait for the next tick, so a dead sink is tried once per push interval.

use billing::{IncrementalEvent, SendError, Sink, TraceId};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::PushConfig;
use crate::metrics::ClientMetrics;
use crate::queue::QueueReader;

pub struct EventSender {
    client: String,
    sink: Arc<dyn Sink>,
    push: PushConfig,
    metrics: ClientMetrics,
    queue: QueueReader<IncrementalEvent>,
    collector_finished: CancellationToken,
}

impl EventSender {
    /// `collector_finished` must only be cancelled once nothing will be enqueued anymore.
    pub fn new(
        client: &str,
        sink: Arc<dyn Sink>,
        push: PushConfig,
        metrics: ClientMetrics,
        queue: QueueReader<IncrementalEvent>,
        collector_finished: CancellationToken,
    ) -> Self {
        EventSender {
            client: client.to_string(),
            sink,
            push,
            metrics,
            queue,
            collector_finished,
        }
    }

    pub async fn run(self) {
        info!(client = %self.client, "Starting billing sender for {}", self.sink.describe());

        let mut push_ticker = interval(self.push.push_every());
        push_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        push_ticker.tick().await; // discard first tick, which is instantaneous

        loop {
            tokio::select! {
                _ = push_ticker.tick() => {
                    self.send_all_current_events().await;
                }
                _ = self.collector_finished.cancelled() => {
                    info!(client = %self.client, "Collector finished, sending remaining events");
                    self.drain_to_empty().await;
                    break;
                }
            }
        }

        info!(client = %self.client, "Billing sender stopped");
    }

    /// Sends every queued event in batches of at most `maxBatchSize`, stopping at the first failed
    /// batch. Returns whether all batches went through.
    pub async fn send_all_current_events(&self) -> bool {
        if self.queue.is_empty() {
            debug!(client = %self.client, "No billing events to push");
            self.metrics.set_last_send_duration(Duration::ZERO);
            return true;
        }

        let start = Instant::now();
        let mut total = 0;
        let mut all_sent = true;

        loop {
            let chunk = self.queue.take(self.push.max_batch_size);
            if chunk.is_empty() {
                break;
            }

            if self.send_batch(&chunk).await.is_err() {
                all_sent = false;
                break;
            }
            total += chunk.len();
        }

        let elapsed = start.elapsed();
        self.metrics.set_last_send_duration(elapsed);
        info!(
            client = %self.client,
            "Pushed {} billing events in {} ms, {} left in queue",
            total,
            elapsed.as_millis(),
            self.queue.size()
        );
        all_sent
    }

    async fn send_batch(&self, chunk: &[IncrementalEvent]) -> Result<(), SendError> {
        let trace_id = TraceId::generate();
        let request = billing::send(self.sink.as_ref(), &trace_id, chunk);

        let result = match timeout(self.push.push_request_timeout(), request).await {
            Ok(result) => result,
            Err(elapsed) => Err(SendError::request(elapsed)),
        };

        match &result {
            Ok(()) => {
                debug!(client = %self.client, trace_id = %trace_id, "Pushed {} events", chunk.len());
                self.metrics.record_sent(chunk.len());
            }
            Err(e) => {
                error!(
                    client = %self.client,
                    trace_id = %trace_id,
                    cause = e.cause(),
                    "Failed to push {} billing events, dropping them: {}",
                    chunk.len(),
                    e
                );
                self.metrics.record_send_error(e.cause());
            }
        }
        result
    }

    /// Each pass removes at least one batch from the queue, so this terminates once the writer
    /// has stopped.
    async fn drain_to_empty(&self) {
        while !self.queue.is_empty() {
            self.send_all_current_events().await;
        }
    }
}
