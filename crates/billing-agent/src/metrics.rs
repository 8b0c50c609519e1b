// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Prometheus metrics describing the agent itself (not the usage it meters).

use prometheus::{
    Encoder, Gauge, GaugeVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::collections::HashMap;
use std::time::Duration;

use crate::workload::Phase;

#[derive(Clone)]
pub struct PromMetrics {
    registry: Registry,
    workloads_current: IntGaugeVec,
    queue_size: IntGaugeVec,
    queue_dropped: IntCounterVec,
    last_send_duration: GaugeVec,
    send_errors: IntCounterVec,
    events_sent: IntCounterVec,
}

impl PromMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let workloads_current = IntGaugeVec::new(
            Opts::new(
                "billing_agent_workloads_current",
                "Number of workloads on this node at the last collection, by billing relevance",
            ),
            &["is_endpoint", "autoscaling_enabled", "phase"],
        )?;
        let queue_size = IntGaugeVec::new(
            Opts::new(
                "billing_agent_queue_size",
                "Number of usage events waiting to be sent",
            ),
            &["client"],
        )?;
        let queue_dropped = IntCounterVec::new(
            Opts::new(
                "billing_agent_queue_dropped_total",
                "Usage events evicted from a full queue",
            ),
            &["client"],
        )?;
        let last_send_duration = GaugeVec::new(
            Opts::new(
                "billing_agent_last_send_duration_seconds",
                "Duration of the last push of all pending events",
            ),
            &["client"],
        )?;
        let send_errors = IntCounterVec::new(
            Opts::new(
                "billing_agent_send_errors_total",
                "Failed batch pushes, by cause",
            ),
            &["client", "cause"],
        )?;
        let events_sent = IntCounterVec::new(
            Opts::new(
                "billing_agent_events_sent_total",
                "Usage events accepted by a sink",
            ),
            &["client"],
        )?;

        registry.register(Box::new(workloads_current.clone()))?;
        registry.register(Box::new(queue_size.clone()))?;
        registry.register(Box::new(queue_dropped.clone()))?;
        registry.register(Box::new(last_send_duration.clone()))?;
        registry.register(Box::new(send_errors.clone()))?;
        registry.register(Box::new(events_sent.clone()))?;

        Ok(PromMetrics {
            registry,
            workloads_current,
            queue_size,
            queue_dropped,
            last_send_duration,
            send_errors,
            events_sent,
        })
    }

    /// Renders every registered metric in the text exposition format.
    pub fn encode(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(buf)
    }

    /// Starts counting workloads for one collection pass.
    #[must_use]
    pub fn for_batch(&self) -> WorkloadCounts {
        WorkloadCounts {
            gauge: self.workloads_current.clone(),
            counts: HashMap::new(),
        }
    }

    #[must_use]
    pub fn for_client(&self, client: &str) -> ClientMetrics {
        ClientMetrics {
            client: client.to_string(),
            queue_size: self.queue_size.with_label_values(&[client]),
            queue_dropped: self.queue_dropped.with_label_values(&[client]),
            last_send_duration: self.last_send_duration.with_label_values(&[client]),
            send_errors: self.send_errors.clone(),
            events_sent: self.events_sent.with_label_values(&[client]),
        }
    }
}

/// Workload tallies for one collection pass, published together by [`WorkloadCounts::finish`].
pub struct WorkloadCounts {
    gauge: IntGaugeVec,
    counts: HashMap<(bool, bool, Phase), i64>,
}

impl WorkloadCounts {
    pub fn inc(&mut self, is_endpoint: bool, autoscaling_enabled: bool, phase: Phase) {
        *self
            .counts
            .entry((is_endpoint, autoscaling_enabled, phase))
            .or_default() += 1;
    }

    /// Replaces every previously published tally, so workloads that vanished stop being counted.
    pub fn finish(self) {
        self.gauge.reset();
        for ((is_endpoint, autoscaling_enabled, phase), count) in self.counts {
            self.gauge
                .with_label_values(&[
                    bool_label(is_endpoint),
                    bool_label(autoscaling_enabled),
                    phase.as_str(),
                ])
                .set(count);
        }
    }
}

fn bool_label(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// Metrics for one sink's queue and sender.
#[derive(Clone)]
pub struct ClientMetrics {
    client: String,
    pub queue_size: IntGauge,
    pub queue_dropped: IntCounter,
    last_send_duration: Gauge,
    send_errors: IntCounterVec,
    events_sent: IntCounter,
}

impl ClientMetrics {
    pub fn set_last_send_duration(&self, duration: Duration) {
        self.last_send_duration.set(duration.as_secs_f64());
    }

    pub fn record_send_error(&self, cause: &str) {
        self.send_errors
            .with_label_values(&[self.client.as_str(), cause])
            .inc();
    }

    pub fn record_sent(&self, count: usize) {
        self.events_sent
            .inc_by(u64::try_from(count).unwrap_or(u64::MAX));
    }

    #[must_use]
    pub fn send_errors(&self, cause: &str) -> u64 {
        self.send_errors
            .with_label_values(&[self.client.as_str(), cause])
            .get()
    }

    #[must_use]
    pub fn events_sent(&self) -> u64 {
        self.events_sent.get()
    }
}
