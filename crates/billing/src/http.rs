// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP push sink: one `POST <base-url>/usage_events` per batch.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::debug;

use crate::errors::SendError;
use crate::sink::{Sink, TraceId};

const USAGE_EVENTS_PATH: &str = "/usage_events";
const TRACE_ID_HEADER: &str = "x-trace-id";

#[derive(Debug, Clone)]
pub struct HttpSink {
    url: String,
    client: reqwest::Client,
}

impl HttpSink {
    /// Builds a sink posting to `<base_url>/usage_events`. `timeout` bounds each request.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(SendError::request)?;
        Ok(Self::with_client(base_url, client))
    }

    #[must_use]
    pub fn with_client(base_url: &str, client: reqwest::Client) -> Self {
        HttpSink {
            url: format!("{}{}", base_url.trim_end_matches('/'), USAGE_EVENTS_PATH),
            client,
        }
    }
}

#[async_trait]
impl Sink for HttpSink {
    async fn send(&self, payload: Vec<u8>, trace_id: &TraceId) -> Result<(), SendError> {
        let resp = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .header(TRACE_ID_HEADER, trace_id.as_str())
            .body(payload)
            .send()
            .await
            .map_err(SendError::request)?;

        // Retrying belongs in a transport layer below this one, not here.
        let status = resp.status();
        if !status.is_success() {
            return Err(SendError::UnexpectedStatusCode(status));
        }

        debug!(trace_id = %trace_id, "Pushed batch to {}", self.url);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("url={}", self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[test]
    fn test_url_joins_path() {
        let sink = HttpSink::with_client("http://billing:8080/", reqwest::Client::new());
        assert_eq!(sink.url, "http://billing:8080/usage_events");
    }

    #[tokio::test]
    async fn test_send_posts_with_trace_header() {
        let mut server = Server::new_async().await;
        let trace_id = TraceId::generate();
        let mock = server
            .mock("POST", "/usage_events")
            .match_header("content-type", "application/json")
            .match_header("x-trace-id", trace_id.as_str())
            .match_body(r#"{"events":[]}"#)
            .with_status(200)
            .create_async()
            .await;

        let sink = HttpSink::new(&server.url(), Duration::from_secs(5)).unwrap();
        sink.send(br#"{"events":[]}"#.to_vec(), &trace_id)
            .await
            .expect("send failed");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_rejects_non_success_status() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/usage_events")
            .with_status(503)
            .expect(1)
            .create_async()
            .await;

        let sink = HttpSink::new(&server.url(), Duration::from_secs(5)).unwrap();
        let err = sink
            .send(b"{}".to_vec(), &TraceId::generate())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SendError::UnexpectedStatusCode(code) if code.as_u16() == 503
        ));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_unreachable_is_request_error() {
        // Nothing listens on port 9 (discard) in the test environment.
        let sink = HttpSink::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        let err = sink
            .send(b"{}".to_vec(), &TraceId::generate())
            .await
            .unwrap_err();

        assert_eq!(err.cause(), "request");
    }
}
