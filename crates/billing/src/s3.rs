// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Object-storage archive sink.
//!
//! Every push becomes one gzip-compressed object under a date-partitioned prefix. Object keys end
//! in a random suffix, so a retried or duplicated push never overwrites an earlier one.

use async_trait::async_trait;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::{Region, RequestChecksumCalculation};
use aws_sdk_s3::primitives::ByteStream;
use chrono::{DateTime, Datelike, Utc};
use flate2::{write::GzEncoder, Compression};
use serde::Deserialize;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::debug;

use crate::errors::SendError;
use crate::sink::{Sink, TraceId};

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3SinkConfig {
    pub bucket: String,
    pub region: String,
    pub prefix_in_bucket: String,
    /// Custom endpoint (e.g. MinIO). Path-style addressing is always used.
    #[serde(default)]
    pub endpoint: Option<String>,
}

pub struct S3Sink {
    config: S3SinkConfig,
    client: aws_sdk_s3::Client,
    now: Clock,
}

impl S3Sink {
    /// Credentials come from the default AWS provider chain.
    pub async fn new(config: S3SinkConfig, now: Clock) -> Self {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        Self::with_s3_config(config, aws_sdk_s3::config::Builder::from(&sdk_config), now)
    }

    /// Builds the sink on top of `builder`, which supplies region and credentials.
    ///
    /// Path-style addressing is forced. SDK retries are off so each push is a single attempt,
    /// and checksums are only sent where S3 requires them so bodies stay plain for
    /// S3-compatible stores.
    #[must_use]
    pub fn with_s3_config(
        config: S3SinkConfig,
        builder: aws_sdk_s3::config::Builder,
        now: Clock,
    ) -> Self {
        let mut builder = builder
            .force_path_style(true)
            .retry_config(RetryConfig::disabled())
            .request_checksum_calculation(RequestChecksumCalculation::WhenRequired);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        S3Sink {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            config,
            now,
        }
    }

    fn key(&self) -> String {
        object_key(
            &self.config.prefix_in_bucket,
            (self.now)(),
            &uuid::Uuid::new_v4().simple().to_string(),
        )
    }
}

/// `<prefix>/year=YYYY/month=MM/day=DD/HH:MM:SSZ_<suffix>.ndjson.gz`
#[must_use]
pub fn object_key(prefix: &str, now: DateTime<Utc>, suffix: &str) -> String {
    format!(
        "{}/year={}/month={:02}/day={:02}/{}_{}.ndjson.gz",
        prefix,
        now.year(),
        now.month(),
        now.day(),
        now.format("%H:%M:%SZ"),
        suffix
    )
}

pub fn gzip(payload: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload)?;
    encoder.finish()
}

#[async_trait]
impl Sink for S3Sink {
    async fn send(&self, payload: Vec<u8>, trace_id: &TraceId) -> Result<(), SendError> {
        let key = self.key();
        let body = gzip(&payload).map_err(SendError::request)?;

        self.client
            .put_object()
            .bucket(&self.config.bucket)
            .key(&key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(SendError::request)?;

        debug!(trace_id = %trace_id, "Wrote s3://{}/{}", self.config.bucket, key);
        Ok(())
    }

    fn describe(&self) -> String {
        format!(
            "bucket={} prefixInBucket={}",
            self.config.bucket, self.config.prefix_in_bucket
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use std::sync::Mutex;

    #[test]
    fn test_object_key_layout() {
        let now = Utc.with_ymd_and_hms(2024, 4, 2, 7, 19, 27).unwrap();

        let key = object_key("billing-agent", now, "DGFMM7kfyLFd");

        assert_eq!(
            key,
            "billing-agent/year=2024/month=04/day=02/07:19:27Z_DGFMM7kfyLFd.ndjson.gz"
        );
    }

    #[test]
    fn test_gzip_round_trips_payload() {
        let payload = br#"{"events":[{"metric":"cpu","value":60}]}"#;

        let compressed = gzip(payload).unwrap();
        let mut decoded = Vec::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_end(&mut decoded)
            .unwrap();

        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_config_deserializes_camel_case() {
        let config: S3SinkConfig = serde_json::from_str(
            r#"{"bucket":"metrics","region":"us-east-1","prefixInBucket":"agent"}"#,
        )
        .unwrap();

        assert_eq!(config.prefix_in_bucket, "agent");
        assert_eq!(config.endpoint, None);
    }

    fn test_config(endpoint: String) -> S3SinkConfig {
        S3SinkConfig {
            bucket: "metrics".to_string(),
            region: "us-east-1".to_string(),
            prefix_in_bucket: "billing-agent".to_string(),
            endpoint: Some(endpoint),
        }
    }

    fn test_sink(endpoint: String) -> S3Sink {
        let builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(aws_sdk_s3::config::Credentials::new(
                "AKIDTEST", "secret", None, None, "test",
            ));
        let now = Utc.with_ymd_and_hms(2024, 4, 2, 7, 19, 27).unwrap();
        S3Sink::with_s3_config(test_config(endpoint), builder, Arc::new(move || now))
    }

    #[tokio::test]
    async fn test_send_puts_gzipped_batch_under_dated_key() {
        let mut server = mockito::Server::new_async().await;
        let bodies = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&bodies);
        let mock = server
            .mock(
                "PUT",
                mockito::Matcher::Regex(
                    r"^/metrics/billing-agent/year=2024/month=04/day=02/07(:|%3A)19(:|%3A)27Z_[0-9a-f]{32}\.ndjson\.gz"
                        .to_string(),
                ),
            )
            .with_status(200)
            .with_body_from_request(move |req| {
                captured.lock().unwrap().push(req.body().unwrap().clone());
                Vec::new()
            })
            .expect(1)
            .create_async()
            .await;

        let payload = br#"{"events":[{"metric":"cpu","value":60}]}"#.to_vec();
        test_sink(server.url())
            .send(payload.clone(), &TraceId::generate())
            .await
            .expect("send failed");

        mock.assert_async().await;
        let bodies = bodies.lock().unwrap();
        let mut decoded = Vec::new();
        GzDecoder::new(bodies[0].as_slice())
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, payload);
    }

    #[tokio::test]
    async fn test_send_rejected_put_is_request_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", mockito::Matcher::Any)
            .with_status(403)
            .with_header("content-type", "application/xml")
            .with_body(
                r#"<?xml version="1.0" encoding="UTF-8"?><Error><Code>AccessDenied</Code><Message>Access Denied</Message></Error>"#,
            )
            .expect(1)
            .create_async()
            .await;

        let result = test_sink(server.url())
            .send(b"{}".to_vec(), &TraceId::generate())
            .await;

        assert!(matches!(result, Err(SendError::Request(_))));
        mock.assert_async().await;
    }
}
