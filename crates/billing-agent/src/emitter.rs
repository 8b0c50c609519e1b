// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Turns the drained usage histories into usage events.

use billing::{enrich, Hostname, IncrementalEvent};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::info;

use crate::accumulator::{MetricsKey, WorkloadHistory};
use crate::config::BillingConfig;
use crate::queue::QueueWriter;

/// Events produced per workload: CPU seconds, active time, ingress bytes, egress bytes.
pub const EVENTS_PER_WORKLOAD: usize = 4;

/// Metric names stamped on the four events of every workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricNames {
    pub cpu: String,
    pub active_time: String,
    pub ingress_bytes: String,
    pub egress_bytes: String,
}

impl From<&BillingConfig> for MetricNames {
    fn from(conf: &BillingConfig) -> Self {
        MetricNames {
            cpu: conf.cpu_metric_name.clone(),
            active_time: conf.active_time_metric_name.clone(),
            ingress_bytes: conf.ingress_bytes_metric_name.clone(),
            egress_bytes: conf.egress_bytes_metric_name.clone(),
        }
    }
}

/// Builds the events for one drain, covering `[window_start, now)`.
///
/// Every history is finalized first so its last known rate is billed right up to `now`. Values
/// are rounded to the nearest integer here and nowhere earlier. Workloads are emitted in key
/// order and each event gets its 1-based position in the drain for its idempotency key.
pub fn drain(
    mut histories: HashMap<MetricsKey, WorkloadHistory>,
    names: &MetricNames,
    hostname: &Hostname,
    window_start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Vec<IncrementalEvent> {
    let mut keys: Vec<MetricsKey> = histories.keys().cloned().collect();
    keys.sort();

    let batch_size = EVENTS_PER_WORKLOAD * keys.len();
    let mut events = Vec::with_capacity(batch_size);

    for key in keys {
        let Some(mut history) = histories.remove(&key) else {
            continue;
        };
        history.finalize();
        let totals = history.totals();

        let values = [
            (&names.cpu, totals.cpu_seconds.round() as u64),
            (
                &names.active_time,
                totals.active_time.as_secs_f64().round() as u64,
            ),
            (&names.ingress_bytes, totals.ingress_bytes),
            (&names.egress_bytes, totals.egress_bytes),
        ];

        for (metric_name, value) in values {
            let event = enrich(
                now,
                hostname,
                events.len() + 1,
                batch_size,
                IncrementalEvent {
                    metric_name: metric_name.clone(),
                    event_type: String::new(),
                    idempotency_key: String::new(),
                    endpoint_id: key.endpoint_id.clone(),
                    start_time: window_start,
                    stop_time: now,
                    value,
                },
            );
            info!(
                idempotency_key = %event.idempotency_key,
                endpoint_id = %event.endpoint_id,
                metric_name = %event.metric_name,
                value = event.value,
                "Adding event to batch"
            );
            events.push(event);
        }
    }

    events
}

/// Copies every event, in order, into each sink's queue.
pub fn enqueue_all(writers: &[QueueWriter<IncrementalEvent>], events: &[IncrementalEvent]) {
    for writer in writers {
        for event in events {
            writer.enqueue(event.clone());
        }
    }
}
