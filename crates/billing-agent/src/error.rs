// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use billing::SendError;

use crate::config::ConfigError;

/// Failures that keep the agent from starting.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to build billing client: {0}")]
    Sink(#[from] SendError),

    #[error("Failed to build sample client: {0}")]
    SampleClient(#[from] reqwest::Error),

    #[error("Failed to register metrics: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Failed to start metrics server: {0}")]
    MetricsServer(#[source] std::io::Error),
}
