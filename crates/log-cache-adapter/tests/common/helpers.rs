// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::{Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use log_cache_adapter::log_cache::LogCacheClient;
use log_cache_adapter::pipeline::{MetricsPipeline, PipelineConfig};
use log_cache_adapter::server::{default_responders, MetricsServer};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

pub struct TestResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: String,
}

/// Starts a metrics server on a random port; cancel the returned token to stop it.
pub async fn start_server(
    client: Arc<dyn LogCacheClient + Send + Sync>,
    config: PipelineConfig,
) -> (SocketAddr, CancellationToken) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind metrics server");
    let addr = listener.local_addr().expect("Failed to get local addr");

    let server = MetricsServer::new(
        Arc::new(MetricsPipeline::new(client, config)),
        default_responders(),
    );
    let shutdown = CancellationToken::new();
    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        server
            .serve(listener, server_shutdown)
            .await
            .expect("metrics server failed");
    });

    (addr, shutdown)
}

/// Send a GET request over TCP and return the collected response
pub async fn send_get_request(
    addr: SocketAddr,
    uri: &str,
    headers: &[(&str, &str)],
) -> Result<TestResponse, Box<dyn std::error::Error>> {
    send_request(addr, Method::GET, uri, headers).await
}

/// Send a bodiless request with `method` over TCP and return the collected response
pub async fn send_request(
    addr: SocketAddr,
    method: Method,
    uri: &str,
    headers: &[(&str, &str)],
) -> Result<TestResponse, Box<dyn std::error::Error>> {
    let stream = timeout(Duration::from_secs(2), tokio::net::TcpStream::connect(addr)).await??;

    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

    tokio::spawn(async move {
        let _ = conn.await;
    });

    let mut request_builder = Request::builder()
        .uri(uri)
        .method(method)
        .header("Host", addr.to_string());
    for (name, value) in headers {
        request_builder = request_builder.header(*name, *value);
    }
    let request = request_builder.body(Empty::<Bytes>::new())?;

    let response = timeout(Duration::from_secs(10), sender.send_request(request)).await??;
    let status = response.status();
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = response.into_body().collect().await?.to_bytes();

    Ok(TestResponse {
        status,
        content_type,
        body: String::from_utf8(bytes.to_vec())?,
    })
}
