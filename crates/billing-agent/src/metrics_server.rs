// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Serves the agent's Prometheus metrics on `GET /metrics`.

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{header, http, Method, Request, Response, StatusCode};
use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::metrics::PromMetrics;

const METRICS_ENDPOINT_PATH: &str = "/metrics";

pub struct MetricsServer {
    listener: TcpListener,
    metrics: PromMetrics,
}

impl MetricsServer {
    pub async fn bind(port: u16, metrics: PromMetrics) -> io::Result<Self> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(&addr).await?;
        Ok(MetricsServer { listener, metrics })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until `cancel` fires.
    pub async fn serve(self, cancel: CancellationToken) {
        if let Ok(addr) = self.local_addr() {
            info!("Serving metrics on {}{}", addr, METRICS_ENDPOINT_PATH);
        }

        let server = hyper::server::conn::http1::Builder::new();
        let mut connections = JoinSet::new();

        loop {
            let conn = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((conn, _)) => conn,
                    Err(e) => {
                        error!("Metrics server failed to accept connection: {e}");
                        continue;
                    }
                },
                Some(finished) = connections.join_next() => {
                    if let Err(e) = finished {
                        error!("Metrics connection handler failed: {:?}", e);
                    }
                    continue;
                }
            };

            let metrics = self.metrics.clone();
            let service = service_fn(move |req| {
                let metrics = metrics.clone();
                async move { handle(&metrics, &req) }
            });
            let conn = hyper_util::rt::TokioIo::new(conn);
            let server = server.clone();
            connections.spawn(async move {
                if let Err(e) = server.serve_connection(conn, service).await {
                    debug!("Metrics connection error: {e}");
                }
            });
        }

        connections.shutdown().await;
        info!("Metrics server stopped");
    }
}

fn handle(
    metrics: &PromMetrics,
    req: &Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, METRICS_ENDPOINT_PATH) => match metrics.encode() {
            Ok(body) => Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
                .body(Full::new(Bytes::from(body))),
            Err(e) => {
                error!("Failed to encode metrics: {e}");
                text_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics")
            }
        },
        _ => text_response(StatusCode::NOT_FOUND, "not found"),
    };

    Ok(response.unwrap_or_else(|e| {
        error!("Failed to build metrics response: {e}");
        let mut fallback = Response::new(Full::new(Bytes::new()));
        *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        fallback
    }))
}

fn text_response(status: StatusCode, body: &'static str) -> http::Result<Response<Full<Bytes>>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::from_static(body.as_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_serves_metrics_and_404s_elsewhere() {
        let metrics = PromMetrics::new().unwrap();
        metrics.for_client("http").queue_size.set(7);

        let server = MetricsServer::bind(0, metrics).await.unwrap();
        let port = server.local_addr().unwrap().port();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(server.serve(cancel.clone()));

        let client = reqwest::Client::new();
        let resp = client
            .get(format!("http://127.0.0.1:{port}/metrics"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = resp.text().await.unwrap();
        assert!(body.contains(r#"billing_agent_queue_size{client="http"} 7"#));

        let resp = client
            .get(format!("http://127.0.0.1:{port}/other"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        cancel.cancel();
        task.await.unwrap();
    }
}
