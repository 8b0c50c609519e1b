// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Node agent metering CPU, active time and network usage of the workloads it hosts.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod accumulator;
pub mod agent;
pub mod collector;
pub mod config;
pub mod emitter;
pub mod error;
pub mod invariant;
pub mod metrics;
pub mod metrics_server;
pub mod queue;
pub mod sample;
pub mod sender;
pub mod store;
pub mod workload;
