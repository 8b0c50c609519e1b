// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The transport seam between the sender and the outside world.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use tracing::debug;

use crate::errors::SendError;
use crate::event::Event;

/// Identifier attached to one push, so a batch can be followed across both sides of the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TraceId(String);

impl TraceId {
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Destination for serialized event batches.
///
/// Implementations perform exactly one delivery attempt per call; retrying is the caller's
/// decision.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn send(&self, payload: Vec<u8>, trace_id: &TraceId) -> Result<(), SendError>;

    /// Where this sink delivers to, for log lines.
    fn describe(&self) -> String;
}

#[derive(Serialize)]
struct Batch<'a, E> {
    events: &'a [E],
}

/// Serializes `events` as one `{"events": [...]}` batch and pushes it through `sink`.
///
/// An empty slice is a no-op. On failure the error is one of [`SendError`]'s variants; nothing
/// is retried.
pub async fn send<E: Event>(
    sink: &dyn Sink,
    trace_id: &TraceId,
    events: &[E],
) -> Result<(), SendError> {
    if events.is_empty() {
        return Ok(());
    }

    let payload = serde_json::to_vec(&Batch { events })?;
    debug!(
        trace_id = %trace_id,
        "Sending {} events ({} bytes) to {}",
        events.len(),
        payload.len(),
        sink.describe()
    );
    sink.send(payload, trace_id).await
}
