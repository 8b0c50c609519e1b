// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Usage events and their enrichment.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

use crate::identity::Hostname;

/// Events carry a server-assigned type tag and an idempotency key. Both are filled in by
/// [`enrich`], so producers never set them by hand.
pub trait Event: Serialize + Send + Sync {
    fn set_type(&mut self);
    fn idempotency_key_mut(&mut self) -> &mut String;
}

/// Usage accrued by one endpoint over the window `[start_time, stop_time)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncrementalEvent {
    #[serde(rename = "metric")]
    pub metric_name: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub idempotency_key: String,
    pub endpoint_id: String,
    #[serde(serialize_with = "serialize_timestamp")]
    pub start_time: DateTime<Utc>,
    #[serde(serialize_with = "serialize_timestamp")]
    pub stop_time: DateTime<Utc>,
    pub value: u64,
}

impl Event for IncrementalEvent {
    fn set_type(&mut self) {
        self.event_type = "incremental".to_string();
    }

    fn idempotency_key_mut(&mut self) -> &mut String {
        &mut self.idempotency_key
    }
}

/// RFC3339 in UTC with microsecond precision. Millisecond keys can collide; nanoseconds add
/// nothing the receiving side uses.
#[must_use]
pub fn format_timestamp(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn serialize_timestamp<S: Serializer>(
    time: &DateTime<Utc>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_timestamp(time))
}

/// Sets the event's type and, unless one was already supplied, its idempotency key.
///
/// The default key is `<time>-<hostname>-<count_in_batch>/<batch_size>`. Events created in the
/// same drain share `now` and `hostname`, so each must get a distinct `count_in_batch`.
pub fn enrich<E: Event>(
    now: DateTime<Utc>,
    hostname: &Hostname,
    count_in_batch: usize,
    batch_size: usize,
    mut event: E,
) -> E {
    event.set_type();

    let key = event.idempotency_key_mut();
    if key.is_empty() {
        *key = format!(
            "{}-{}-{}/{}",
            format_timestamp(&now),
            hostname,
            count_in_batch,
            batch_size
        );
    }

    event
}
