// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types for shipping usage events.

use reqwest::StatusCode;

/// Failure to deliver one batch of events.
///
/// Every failure of [`crate::send`] is one of these three kinds, so callers can count them
/// separately without inspecting messages.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Error marshaling events: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Error making request: {0}")]
    Request(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Unexpected HTTP status code {0}")]
    UnexpectedStatusCode(StatusCode),
}

impl SendError {
    pub fn request(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Request(Box::new(err))
    }

    /// Short, stable label for metrics.
    #[must_use]
    pub fn cause(&self) -> &'static str {
        match self {
            Self::Json(_) => "json",
            Self::Request(_) => "request",
            Self::UnexpectedStatusCode(_) => "status_code",
        }
    }
}
