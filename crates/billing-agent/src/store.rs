// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Workload discovery.
//!
//! The collector only ever asks two questions of the store: is it currently failing, and which
//! workloads does it know about. It never writes to it.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::workload::Workload;

pub trait WorkloadStore: Send + Sync {
    /// True while the store cannot vouch for its contents.
    fn failing(&self) -> bool;

    /// True once the store has permanently stopped refreshing.
    fn stopped(&self) -> bool;

    fn list_matching(&self, predicate: &dyn Fn(&Workload) -> bool) -> Vec<Workload>;
}

/// Store backed by a JSON inventory file (an array of workloads), refreshed in the background.
///
/// A failed read or parse keeps the last good listing but flips [`WorkloadStore::failing`] until
/// the next successful refresh.
pub struct InventoryFileStore {
    path: PathBuf,
    workloads: RwLock<Vec<Workload>>,
    failing: AtomicBool,
    stopped: AtomicBool,
}

impl InventoryFileStore {
    /// Starts out failing until the first refresh succeeds.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        InventoryFileStore {
            path: path.into(),
            workloads: RwLock::new(Vec::new()),
            failing: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
        }
    }

    pub async fn refresh(&self) {
        let result = tokio::fs::read(&self.path)
            .await
            .map_err(|e| e.to_string())
            .and_then(|bytes| {
                serde_json::from_slice::<Vec<Workload>>(&bytes).map_err(|e| e.to_string())
            });

        match result {
            Ok(workloads) => {
                debug!("Loaded {} workloads from {}", workloads.len(), self.path.display());
                #[allow(clippy::expect_used)]
                let mut guard = self.workloads.write().expect("lock poisoned");
                *guard = workloads;
                self.failing.store(false, Ordering::Release);
            }
            Err(e) => {
                error!("Failed to refresh inventory {}: {}", self.path.display(), e);
                self.failing.store(true, Ordering::Release);
            }
        }
    }

    /// Refreshes every `refresh_every` until `cancel` fires, then marks the store stopped.
    pub async fn run(&self, refresh_every: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(refresh_every);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.refresh().await,
                _ = cancel.cancelled() => break,
            }
        }
        info!("Inventory store stopped");
        self.stopped.store(true, Ordering::Release);
    }
}

impl WorkloadStore for InventoryFileStore {
    fn failing(&self) -> bool {
        self.failing.load(Ordering::Acquire)
    }

    fn stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn list_matching(&self, predicate: &dyn Fn(&Workload) -> bool) -> Vec<Workload> {
        #[allow(clippy::expect_used)]
        let guard = self.workloads.read().expect("lock poisoned");
        guard.iter().filter(|w| predicate(w)).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const INVENTORY: &str = r#"[
        {"uid":"a","name":"compute-a","endpointId":"ep-a","phase":"Running","cpusMilli":1000},
        {"uid":"b","name":"compute-b","phase":"Pending"}
    ]"#;

    fn write_inventory(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_refresh_loads_workloads() {
        let file = write_inventory(INVENTORY);
        let store = InventoryFileStore::new(file.path());
        assert!(store.failing());

        store.refresh().await;

        assert!(!store.failing());
        assert_eq!(store.list_matching(&|_| true).len(), 2);
        let with_endpoint = store.list_matching(&|w| w.endpoint_id.is_some());
        assert_eq!(with_endpoint.len(), 1);
        assert_eq!(with_endpoint[0].uid, "a");
    }

    #[tokio::test]
    async fn test_bad_inventory_marks_failing_and_keeps_last_listing() {
        let file = write_inventory(INVENTORY);
        let store = InventoryFileStore::new(file.path());
        store.refresh().await;

        std::fs::write(file.path(), "not json").unwrap();
        store.refresh().await;

        assert!(store.failing());
        assert_eq!(store.list_matching(&|_| true).len(), 2);
    }

    #[tokio::test]
    async fn test_run_marks_stopped_on_cancel() {
        let file = write_inventory(INVENTORY);
        let store = std::sync::Arc::new(InventoryFileStore::new(file.path()));
        let cancel = CancellationToken::new();

        let task = {
            let store = store.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { store.run(Duration::from_millis(10), cancel).await })
        };
        assert!(!store.stopped());

        cancel.cancel();
        task.await.unwrap();

        assert!(store.stopped());
    }
}
