// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Client side of the usage-events API.
//!
//! Events are enriched with a type tag and an idempotency key before they leave the process, then
//! serialized as one `{"events": [...]}` batch and handed to a [`sink::Sink`]. Sinks only move
//! bytes; they know nothing about how the events were produced.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod errors;
pub mod event;
pub mod http;
pub mod identity;
pub mod s3;
pub mod sink;

pub use errors::SendError;
pub use event::{enrich, Event, IncrementalEvent};
pub use identity::Hostname;
pub use sink::{send, Sink, TraceId};
