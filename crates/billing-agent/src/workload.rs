// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! What the discovery collaborator tells us about a workload.

use serde::Deserialize;
use std::fmt;

/// CPU allocation in thousandths of a core.
///
/// Kept integral so two allocations can be compared exactly when deciding whether time slices
/// merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(transparent)]
pub struct MilliCpu(pub u32);

impl MilliCpu {
    #[must_use]
    pub fn as_f64(self) -> f64 {
        f64::from(self.0) / 1000.0
    }
}

impl fmt::Display for MilliCpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}m", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum Phase {
    Pending,
    Running,
    Succeeded,
    Failed,
    PreMigrating,
    Migrating,
    Scaling,
}

impl Phase {
    #[must_use]
    pub fn is_alive(self) -> bool {
        matches!(
            self,
            Phase::Running | Phase::PreMigrating | Phase::Migrating | Phase::Scaling
        )
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Pending => "Pending",
            Phase::Running => "Running",
            Phase::Succeeded => "Succeeded",
            Phase::Failed => "Failed",
            Phase::PreMigrating => "PreMigrating",
            Phase::Migrating => "Migrating",
            Phase::Scaling => "Scaling",
        }
    }
}

/// One workload as listed by the discovery collaborator.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workload {
    pub uid: String,
    pub name: String,
    /// Billing endpoint; workloads without one are never metered.
    #[serde(default)]
    pub endpoint_id: Option<String>,
    pub phase: Phase,
    #[serde(default)]
    pub autoscaling_enabled: bool,
    /// Current CPU allocation, if known.
    #[serde(default)]
    pub cpus_milli: Option<MilliCpu>,
    /// `host:port` of the workload's runner, which reports network usage.
    #[serde(default)]
    pub runner_address: Option<String>,
}

impl Workload {
    /// Returns the allocation to bill when this workload is billing-eligible: it has an endpoint,
    /// is alive, and its CPU allocation is known.
    #[must_use]
    pub fn billable_cpu(&self) -> Option<(&str, MilliCpu)> {
        let endpoint_id = self.endpoint_id.as_deref()?;
        if !self.phase.is_alive() {
            return None;
        }
        Some((endpoint_id, self.cpus_milli?))
    }
}
