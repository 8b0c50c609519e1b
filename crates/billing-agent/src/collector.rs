// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The collection driver: samples workloads on one cadence, drains usage into events on another.
//!
//! All accounting state lives here and is only touched from the driver's task. Sample fetches
//! run concurrently but hand their results back through the join, never through shared state.

use billing::{Hostname, IncrementalEvent};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::accumulator::{
    carry_forward_counters, Accumulator, InstantSample, MetricsKey, Snapshot,
};
use crate::emitter::{self, MetricNames};
use crate::invariant::fatal;
use crate::metrics::PromMetrics;
use crate::queue::QueueWriter;
use crate::sample::{fetch_sample, NetworkUsageSource};
use crate::store::WorkloadStore;

/// Accounting state carried between ticks.
#[derive(Debug)]
pub struct MetricsState {
    /// Samples taken at `last_collect_time`.
    pub present: Snapshot,
    pub last_collect_time: Option<DateTime<Utc>>,
    /// Start of the open accounting window.
    pub push_window_start: DateTime<Utc>,
    pub accumulator: Accumulator,
}

impl MetricsState {
    #[must_use]
    pub fn new(push_window_start: DateTime<Utc>) -> Self {
        MetricsState {
            present: Snapshot::new(),
            last_collect_time: None,
            push_window_start,
            accumulator: Accumulator::new(),
        }
    }
}

pub struct Collector {
    store: Arc<dyn WorkloadStore>,
    source: Arc<dyn NetworkUsageSource>,
    metrics: PromMetrics,
    names: MetricNames,
    hostname: Hostname,
    writers: Vec<QueueWriter<IncrementalEvent>>,
    state: MetricsState,
}

impl Collector {
    /// The first accounting window opens at `start`.
    pub fn new(
        store: Arc<dyn WorkloadStore>,
        source: Arc<dyn NetworkUsageSource>,
        metrics: PromMetrics,
        names: MetricNames,
        hostname: Hostname,
        writers: Vec<QueueWriter<IncrementalEvent>>,
        start: DateTime<Utc>,
    ) -> Self {
        Collector {
            store,
            source,
            metrics,
            names,
            hostname,
            writers,
            state: MetricsState::new(start),
        }
    }

    #[must_use]
    pub fn state(&self) -> &MetricsState {
        &self.state
    }

    /// Runs until `cancel` fires, then drains the final partial window into the queues.
    ///
    /// Nothing is collected once cancellation has been observed.
    pub async fn run(
        mut self,
        collect_every: Duration,
        accumulate_every: Duration,
        cancel: CancellationToken,
    ) {
        info!(
            "Starting billing collector: collect every {:?}, accumulate every {:?}",
            collect_every, accumulate_every
        );

        let mut collect_ticker = interval(collect_every);
        collect_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut accumulate_ticker = interval_at(Instant::now() + accumulate_every, accumulate_every);
        accumulate_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = collect_ticker.tick() => {
                    self.collect(Utc::now(), &cancel).await;
                }
                _ = accumulate_ticker.tick() => {
                    self.drain_enqueue(Utc::now());
                }
            }
        }

        info!("Billing collector stopping, draining final window");
        self.drain_enqueue(Utc::now());
    }

    /// One collection pass at `now`.
    ///
    /// Skipped entirely while the store is failing; `last_collect_time` then stays put so the
    /// next good pass bills the whole gap at the lower of its two bounding samples. That slice
    /// starts before `push_window_start` when the outage outlived a drain, so the event carrying
    /// it can report more active time than its own `[start_time, stop_time)` spans.
    pub async fn collect(&mut self, now: DateTime<Utc>, cancel: &CancellationToken) {
        // The store only stops once the agent is shutting down. Stopping earlier means nothing
        // would ever refresh the listing again.
        if self.store.stopped() && !cancel.is_cancelled() {
            fatal("workload store stopped while the agent is still running");
        }

        if self.store.failing() {
            warn!("Workload store is failing, skipping billing collection");
            return;
        }

        let workloads = self.store.list_matching(&|_| true);
        let mut counts = self.metrics.for_batch();
        let mut fetches = JoinSet::new();
        let mut allocations = HashMap::new();

        for workload in workloads {
            counts.inc(
                workload.endpoint_id.is_some(),
                workload.autoscaling_enabled,
                workload.phase,
            );

            let Some((endpoint_id, cpu)) = workload.billable_cpu() else {
                continue;
            };
            let key = MetricsKey {
                uid: workload.uid.clone(),
                endpoint_id: endpoint_id.to_string(),
            };

            allocations.insert(key.clone(), cpu);

            let source = Arc::clone(&self.source);
            let cancel = cancel.clone();
            fetches.spawn(async move {
                let sample = fetch_sample(source.as_ref(), &workload, cpu, &cancel).await;
                (key, sample)
            });
        }
        counts.finish();

        let mut current = Snapshot::with_capacity(allocations.len());
        while let Some(joined) = fetches.join_next().await {
            match joined {
                Ok((key, sample)) => {
                    current.insert(key, sample);
                }
                Err(e) => error!("Sample fetch task failed: {}", e),
            }
        }

        // A fetch task that died degrades like any other failed fetch: CPU is still known.
        for (key, cpu) in allocations {
            current
                .entry(key)
                .or_insert(InstantSample { cpu, network: None });
        }

        carry_forward_counters(&self.state.present, &mut current);
        if let Some(previous_time) = self.state.last_collect_time {
            self.state
                .accumulator
                .update(&self.state.present, &current, previous_time, now);
        }

        debug!(
            "Collected {} billable workloads, {} with history",
            current.len(),
            self.state.accumulator.len()
        );
        self.state.present = current;
        self.state.last_collect_time = Some(now);
    }

    /// Closes the window `[push_window_start, now)`, returning the events it enqueued.
    pub fn drain_enqueue(&mut self, now: DateTime<Utc>) -> Vec<IncrementalEvent> {
        let histories = self.state.accumulator.take();
        let events = emitter::drain(
            histories,
            &self.names,
            &self.hostname,
            self.state.push_window_start,
            now,
        );
        self.state.push_window_start = now;

        emitter::enqueue_all(&self.writers, &events);
        info!("Enqueued {} billing events", events.len());
        events
    }
}
