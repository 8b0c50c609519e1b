// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Instantaneous samples of a workload's usage.

use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::accumulator::{InstantSample, NetworkUsage};
use crate::workload::{MilliCpu, Workload};

const NETWORK_USAGE_PATH: &str = "/network_usage";

#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("workload has no runner address")]
    NoRunnerAddress,

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    UnexpectedStatusCode(StatusCode),

    #[error("cancelled")]
    Cancelled,
}

/// Fetches a workload's cumulative network counters.
#[async_trait]
pub trait NetworkUsageSource: Send + Sync {
    async fn network_usage(&self, workload: &Workload) -> Result<NetworkUsage, SampleError>;
}

/// Asks the workload's runner over HTTP: `GET http://<runner>/network_usage`.
#[derive(Debug, Clone)]
pub struct HttpNetworkUsageSource {
    client: reqwest::Client,
}

impl HttpNetworkUsageSource {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(HttpNetworkUsageSource { client })
    }
}

#[async_trait]
impl NetworkUsageSource for HttpNetworkUsageSource {
    async fn network_usage(&self, workload: &Workload) -> Result<NetworkUsage, SampleError> {
        let address = workload
            .runner_address
            .as_deref()
            .ok_or(SampleError::NoRunnerAddress)?;

        let resp = self
            .client
            .get(format!("http://{address}{NETWORK_USAGE_PATH}"))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(SampleError::UnexpectedStatusCode(resp.status()));
        }
        Ok(resp.json::<NetworkUsage>().await?)
    }
}

/// Samples one workload at `cpu`.
///
/// Never fails: if the counters can't be fetched (or `cancel` fires first) the sample carries no
/// counters, which bills zero bytes for this tick.
pub async fn fetch_sample(
    source: &dyn NetworkUsageSource,
    workload: &Workload,
    cpu: MilliCpu,
    cancel: &CancellationToken,
) -> InstantSample {
    let result = tokio::select! {
        result = source.network_usage(workload) => result,
        _ = cancel.cancelled() => Err(SampleError::Cancelled),
    };

    let network = match result {
        Ok(usage) => Some(usage),
        Err(e) => {
            warn!(uid = %workload.uid, "Failed to get network usage for {}: {}", workload.name, e);
            None
        }
    };

    InstantSample { cpu, network }
}
