// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Turns consecutive point-in-time samples into duration-weighted usage totals.
//!
//! Every pair of samples for the same workload becomes a [`TimeSlice`] covering the time between
//! them. While usage stays the same, slices merge, so a steady workload costs one open slice no
//! matter how many ticks it lives through. A slice is only added to the running totals
//! ("committed") when usage changes or the history is drained.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::invariant::fatal;
use crate::workload::MilliCpu;

/// Identity of a billable workload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricsKey {
    pub uid: String,
    pub endpoint_id: String,
}

/// Network byte counters, cumulative since the workload's own process started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct NetworkUsage {
    pub ingress_bytes: u64,
    pub egress_bytes: u64,
}

/// Snapshot of one workload at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstantSample {
    pub cpu: MilliCpu,
    /// `None` when the counters could not be fetched this tick.
    pub network: Option<NetworkUsage>,
}

pub type Snapshot = HashMap<MetricsKey, InstantSample>;

/// What to bill for the whole of one time slice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateRecord {
    pub cpu: MilliCpu,
    pub ingress_bytes: u64,
    pub egress_bytes: u64,
}

impl RateRecord {
    /// CPU is the lower of the two samples: with no visibility into what happened between them,
    /// we never bill more than any monotonic path between the endpoints would.
    #[must_use]
    pub fn between(previous: &InstantSample, current: &InstantSample) -> Self {
        let (ingress_bytes, egress_bytes) = match (previous.network, current.network) {
            (Some(prev), Some(cur)) => (
                counter_delta(prev.ingress_bytes, cur.ingress_bytes),
                counter_delta(prev.egress_bytes, cur.egress_bytes),
            ),
            _ => (0, 0),
        };

        RateRecord {
            cpu: previous.cpu.min(current.cpu),
            ingress_bytes,
            egress_bytes,
        }
    }
}

/// A counter that went backwards was reset by a restart; everything it holds is new.
fn counter_delta(previous: u64, current: u64) -> u64 {
    if current >= previous {
        current - previous
    } else {
        current
    }
}

/// Half-open interval `[start, end)` billed at a single rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSlice {
    pub rate: RateRecord,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeSlice {
    #[must_use]
    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    /// Extends `self` to cover `next` if `next` starts exactly where `self` ends and bills the
    /// same rate. Returns whether the merge happened.
    pub fn try_merge(&mut self, next: &TimeSlice) -> bool {
        let merged = self.end == next.start && self.rate == next.rate;
        if merged {
            self.end = next.end;
        }
        merged
    }
}

/// Committed usage since the last drain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageTotals {
    /// Integral of the CPU allocation over time. Rounded only when emitted.
    pub cpu_seconds: f64,
    pub active_time: Duration,
    pub ingress_bytes: u64,
    pub egress_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkloadHistory {
    open_slice: Option<TimeSlice>,
    totals: UsageTotals,
}

impl WorkloadHistory {
    #[must_use]
    pub fn open_slice(&self) -> Option<&TimeSlice> {
        self.open_slice.as_ref()
    }

    #[must_use]
    pub fn totals(&self) -> &UsageTotals {
        &self.totals
    }

    /// Merges `slice` into the open slice, or commits the open slice and opens `slice`.
    pub fn append_slice(&mut self, slice: TimeSlice) {
        if let Some(open) = self.open_slice.as_mut() {
            if open.try_merge(&slice) {
                return;
            }
        }

        self.finalize();
        self.open_slice = Some(slice);
    }

    /// Commits the open slice, if any, into the totals.
    pub fn finalize(&mut self) {
        let Some(slice) = self.open_slice.take() else {
            return;
        };

        // Slices span [last collection, now) on a single wall clock. A negative duration means
        // the clock went backwards or timestamps were mixed up; it cannot happen under correct
        // operation.
        let Ok(duration) = slice.duration().to_std() else {
            fatal("negative time slice duration")
        };

        self.totals.cpu_seconds += duration.as_secs_f64() * slice.rate.cpu.as_f64();
        self.totals.active_time += duration;
        self.totals.ingress_bytes = self
            .totals
            .ingress_bytes
            .saturating_add(slice.rate.ingress_bytes);
        self.totals.egress_bytes = self
            .totals
            .egress_bytes
            .saturating_add(slice.rate.egress_bytes);
    }
}

/// Copies the last known counters into samples whose fetch failed, so the next successful
/// fetch is measured against real counters instead of zero.
pub fn carry_forward_counters(previous: &Snapshot, current: &mut Snapshot) {
    for (key, sample) in current.iter_mut() {
        if sample.network.is_none() {
            sample.network = previous.get(key).and_then(|prev| prev.network);
        }
    }
}

/// Per-workload usage history for the open accounting window.
#[derive(Debug, Default)]
pub struct Accumulator {
    histories: HashMap<MetricsKey, WorkloadHistory>,
}

impl Accumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a slice `[previous_time, now)` for every workload present in both snapshots.
    ///
    /// Workloads seen for the first time, or gone since `previous`, get nothing for this tick.
    pub fn update(
        &mut self,
        previous: &Snapshot,
        current: &Snapshot,
        previous_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) {
        for (key, current_sample) in current {
            let Some(previous_sample) = previous.get(key) else {
                continue;
            };

            let slice = TimeSlice {
                rate: RateRecord::between(previous_sample, current_sample),
                start: previous_time,
                end: now,
            };

            self.histories
                .entry(key.clone())
                .or_default()
                .append_slice(slice);
        }
    }

    #[must_use]
    pub fn get(&self, key: &MetricsKey) -> Option<&WorkloadHistory> {
        self.histories.get(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.histories.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.histories.is_empty()
    }

    /// Hands over every history and starts again from an empty map.
    pub fn take(&mut self) -> HashMap<MetricsKey, WorkloadHistory> {
        std::mem::take(&mut self.histories)
    }
}
