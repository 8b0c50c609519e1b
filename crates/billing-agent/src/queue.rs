// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Hand-off queue between the collector (single writer) and one sender (single reader).
//!
//! The queue is FIFO and bounded. When full, the oldest pending item is evicted so the collector
//! never waits on a slow or unreachable sink. The current length is readable without taking the
//! lock and is mirrored into a gauge on every change.

use prometheus::{IntCounter, IntGauge};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::warn;

struct Shared<T> {
    items: Mutex<VecDeque<T>>,
    len: AtomicUsize,
    capacity: usize,
    size_gauge: IntGauge,
    dropped: IntCounter,
}

impl<T> Shared<T> {
    fn publish_len(&self, len: usize) {
        self.len.store(len, Ordering::Release);
        self.size_gauge.set(i64::try_from(len).unwrap_or(i64::MAX));
    }
}

pub struct QueueWriter<T> {
    shared: Arc<Shared<T>>,
}

pub struct QueueReader<T> {
    shared: Arc<Shared<T>>,
}

/// Creates a queue holding at most `capacity` items (at least one).
pub fn new_event_queue<T>(
    capacity: usize,
    size_gauge: IntGauge,
    dropped: IntCounter,
) -> (QueueWriter<T>, QueueReader<T>) {
    let shared = Arc::new(Shared {
        items: Mutex::new(VecDeque::new()),
        len: AtomicUsize::new(0),
        capacity: capacity.max(1),
        size_gauge,
        dropped,
    });
    shared.publish_len(0);

    (
        QueueWriter {
            shared: Arc::clone(&shared),
        },
        QueueReader { shared },
    )
}

impl<T> QueueWriter<T> {
    pub fn enqueue(&self, item: T) {
        #[allow(clippy::expect_used)]
        let mut items = self.shared.items.lock().expect("lock poisoned");

        if items.len() >= self.shared.capacity {
            items.pop_front();
            self.shared.dropped.inc();
            warn!(
                "Event queue full at {} items, dropped oldest event",
                self.shared.capacity
            );
        }
        items.push_back(item);
        self.shared.publish_len(items.len());
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.shared.len.load(Ordering::Acquire)
    }
}

impl<T> QueueReader<T> {
    #[must_use]
    pub fn size(&self) -> usize {
        self.shared.len.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Removes and returns up to `limit` items from the front of the queue.
    pub fn take(&self, limit: usize) -> Vec<T> {
        #[allow(clippy::expect_used)]
        let mut items = self.shared.items.lock().expect("lock poisoned");

        let count = limit.min(items.len());
        let batch: Vec<T> = items.drain(..count).collect();
        self.shared.publish_len(items.len());
        batch
    }
}
