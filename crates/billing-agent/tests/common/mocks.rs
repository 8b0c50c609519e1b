// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory collaborators for driving the collector without files or runners

use async_trait::async_trait;
use billing_agent::accumulator::NetworkUsage;
use billing_agent::sample::{NetworkUsageSource, SampleError};
use billing_agent::store::WorkloadStore;
use billing_agent::workload::{MilliCpu, Phase, Workload};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Workload store whose listing and health are set by the test
#[derive(Default)]
pub struct MockStore {
    workloads: Mutex<Vec<Workload>>,
    failing: AtomicBool,
}

#[allow(dead_code)]
impl MockStore {
    pub fn set(&self, workloads: Vec<Workload>) {
        *self.workloads.lock().unwrap() = workloads;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl WorkloadStore for MockStore {
    fn failing(&self) -> bool {
        self.failing.load(Ordering::SeqCst)
    }

    fn stopped(&self) -> bool {
        false
    }

    fn list_matching(&self, predicate: &dyn Fn(&Workload) -> bool) -> Vec<Workload> {
        let workloads = self.workloads.lock().unwrap();
        workloads.iter().filter(|w| predicate(w)).cloned().collect()
    }
}

/// Network counters keyed by workload uid; unknown uids fail the fetch
#[derive(Default)]
pub struct MockSource {
    usage: Mutex<HashMap<String, NetworkUsage>>,
}

#[allow(dead_code)]
impl MockSource {
    pub fn set(&self, uid: &str, ingress_bytes: u64, egress_bytes: u64) {
        self.usage.lock().unwrap().insert(
            uid.to_string(),
            NetworkUsage {
                ingress_bytes,
                egress_bytes,
            },
        );
    }
}

#[async_trait]
impl NetworkUsageSource for MockSource {
    async fn network_usage(&self, workload: &Workload) -> Result<NetworkUsage, SampleError> {
        self.usage
            .lock()
            .unwrap()
            .get(&workload.uid)
            .copied()
            .ok_or(SampleError::NoRunnerAddress)
    }
}

#[allow(dead_code)]
pub fn running(uid: &str, endpoint_id: &str, cpus_milli: u32) -> Workload {
    Workload {
        uid: uid.to_string(),
        name: format!("compute-{uid}"),
        endpoint_id: Some(endpoint_id.to_string()),
        phase: Phase::Running,
        autoscaling_enabled: false,
        cpus_milli: Some(MilliCpu(cpus_milli)),
        runner_address: None,
    }
}
