// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! End-to-end tests: a scraper hits `/metrics` on a live server backed by a mocked log-cache.

mod common;

use common::helpers::{send_get_request, send_request, start_server};
use common::mocks::{counter_envelope, gauge_envelope, MockLogCacheClient};
use hyper::{Method, StatusCode};
use log_cache_adapter::log_cache::HttpLogCacheClient;
use log_cache_adapter::pipeline::PipelineConfig;
use mockito::{Matcher, Server, ServerGuard};
use std::sync::Arc;
use std::time::Duration;

const SOURCE_A: &str = "aaaaaaaa-aaaa-aaaa-aaaa-aaaaaaaaaaaa";
const SOURCE_B: &str = "bbbbbbbb-bbbb-bbbb-bbbb-bbbbbbbbbbbb";
const TOKEN: &str = "bearer scrape-token";

fn http_client(server: &ServerGuard) -> Arc<HttpLogCacheClient> {
    Arc::new(
        HttpLogCacheClient::new(&server.url(), None, Duration::from_secs(5))
            .expect("failed to build log-cache client"),
    )
}

fn counter_body(source_id: &str) -> String {
    format!(
        r#"{{"envelopes":{{"batch":[{{"timestamp":"1","source_id":"{source_id}","instance_id":"0","tags":{{"tag-a":"val-a"}},"counter":{{"name":"counter","delta":"1","total":"8"}}}}]}}}}"#
    )
}

fn gauge_body(source_id: &str) -> String {
    format!(
        r#"{{"envelopes":{{"batch":[{{"timestamp":"1","source_id":"{source_id}","tags":{{"tag-b":"val-b"}},"gauge":{{"metrics":{{"a-gauge":{{"unit":"ms","value":3.14}}}}}}}}]}}}}"#
    )
}

async fn mock_read(server: &mut ServerGuard, source_id: &str, status: usize, body: String) {
    server
        .mock("GET", format!("/v1/read/{source_id}").as_str())
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("envelope_types".into(), "COUNTER".into()),
            Matcher::UrlEncoded("envelope_types".into(), "GAUGE".into()),
        ]))
        .match_header("authorization", TOKEN)
        .with_status(status)
        .with_body(body)
        .create_async()
        .await;
}

#[tokio::test]
async fn test_rejects_missing_authorization() {
    let (addr, shutdown) =
        start_server(Arc::new(MockLogCacheClient::default()), PipelineConfig::default()).await;

    let response = send_get_request(addr, "/metrics", &[]).await.unwrap();
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let response = send_get_request(addr, "/metrics", &[("Authorization", "")])
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    shutdown.cancel();
}

#[tokio::test]
async fn test_rejects_unacceptable_media_type() {
    let client = Arc::new(MockLogCacheClient::default());
    let (addr, shutdown) = start_server(client.clone(), PipelineConfig::default()).await;

    let response = send_get_request(
        addr,
        "/metrics",
        &[("Authorization", TOKEN), ("Accept", "text/html")],
    )
    .await
    .unwrap();

    assert_eq!(response.status, StatusCode::NOT_ACCEPTABLE);
    assert!(
        client.tokens_seen.lock().unwrap().is_empty(),
        "log-cache must not be contacted for a rejected request"
    );
    shutdown.cancel();
}

#[tokio::test]
async fn test_unknown_path_and_method() {
    let client = Arc::new(MockLogCacheClient::default().with_source(
        SOURCE_A,
        Some(vec![counter_envelope(SOURCE_A, "requests", 1, &[])]),
    ));
    let (addr, shutdown) = start_server(client.clone(), PipelineConfig::default()).await;

    let response = send_get_request(addr, "/other", &[("Authorization", TOKEN)])
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    for method in [Method::POST, Method::PUT, Method::DELETE] {
        let response = send_request(addr, method.clone(), "/metrics", &[("Authorization", TOKEN)])
            .await
            .unwrap();
        assert_eq!(
            response.status,
            StatusCode::METHOD_NOT_ALLOWED,
            "{method} /metrics"
        );
    }

    assert!(
        client.tokens_seen.lock().unwrap().is_empty(),
        "log-cache must not be contacted for a rejected request"
    );
    shutdown.cancel();
}

#[tokio::test]
async fn test_no_sources_returns_empty_body() {
    let mut upstream = Server::new_async().await;
    upstream
        .mock("GET", "/v1/meta")
        .with_status(200)
        .with_body(r#"{"meta":{}}"#)
        .create_async()
        .await;

    let (addr, shutdown) = start_server(http_client(&upstream), PipelineConfig::default()).await;
    let response = send_get_request(addr, "/metrics", &[("Authorization", TOKEN)])
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.content_type.as_deref(), Some("text/plain"));
    assert_eq!(response.body, "");
    shutdown.cancel();
}

#[tokio::test]
async fn test_serves_counters_and_gauges_from_log_cache() {
    let mut upstream = Server::new_async().await;
    let meta = upstream
        .mock("GET", "/v1/meta")
        .match_header("authorization", TOKEN)
        .with_status(200)
        .with_body(format!(
            r#"{{"meta":{{"{SOURCE_A}":{{"count":"1"}},"{SOURCE_B}":{{"count":"1"}},"doppler":{{"count":"99"}}}}}}"#
        ))
        .create_async()
        .await;
    mock_read(&mut upstream, SOURCE_A, 200, counter_body(SOURCE_A)).await;
    mock_read(&mut upstream, SOURCE_B, 200, gauge_body(SOURCE_B)).await;
    let doppler = upstream
        .mock("GET", "/v1/read/doppler")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let (addr, shutdown) = start_server(http_client(&upstream), PipelineConfig::default()).await;
    let response = send_get_request(
        addr,
        "/metrics",
        &[("Authorization", TOKEN), ("Accept", "text/plain")],
    )
    .await
    .unwrap();

    meta.assert_async().await;
    doppler.assert_async().await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.content_type.as_deref(), Some("text/plain"));
    assert!(response.body.contains(&format!(
        "counter{{instance_id=\"{SOURCE_A}\",tag_a=\"val-a\"}} 8\n"
    )));
    assert!(response.body.contains(&format!(
        "a_gauge{{instance_id=\"{SOURCE_B}\",tag_b=\"val-b\"}} 3.14\n"
    )));
    shutdown.cancel();
}

#[tokio::test]
async fn test_discovery_failure_returns_500() {
    let mut upstream = Server::new_async().await;
    upstream
        .mock("GET", "/v1/meta")
        .with_status(502)
        .with_body("bad gateway")
        .create_async()
        .await;

    let (addr, shutdown) = start_server(http_client(&upstream), PipelineConfig::default()).await;
    let response = send_get_request(addr, "/metrics", &[("Authorization", TOKEN)])
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.body.contains("Cannot connect to log-cache"));
    shutdown.cancel();
}

#[tokio::test]
async fn test_failed_source_is_skipped() {
    let mut upstream = Server::new_async().await;
    upstream
        .mock("GET", "/v1/meta")
        .with_status(200)
        .with_body(format!(
            r#"{{"meta":{{"{SOURCE_A}":{{}},"{SOURCE_B}":{{}}}}}}"#
        ))
        .create_async()
        .await;
    mock_read(&mut upstream, SOURCE_A, 200, counter_body(SOURCE_A)).await;
    mock_read(&mut upstream, SOURCE_B, 500, "boom".to_string()).await;

    let (addr, shutdown) = start_server(http_client(&upstream), PipelineConfig::default()).await;
    let response = send_get_request(addr, "/metrics", &[("Authorization", TOKEN)])
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains(SOURCE_A));
    assert!(!response.body.contains(SOURCE_B));
    shutdown.cancel();
}

#[tokio::test]
async fn test_conversion_failure_returns_500() {
    let client = MockLogCacheClient::default().with_source(
        SOURCE_A,
        Some(vec![counter_envelope(SOURCE_A, "", 1, &[])]),
    );
    let (addr, shutdown) = start_server(Arc::new(client), PipelineConfig::default()).await;

    let response = send_get_request(addr, "/metrics", &[("Authorization", TOKEN)])
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response
        .body
        .contains("Error converting log-cache metrics to prometheus format"));
    shutdown.cancel();
}

#[tokio::test]
async fn test_output_independent_of_completion_order() {
    let sources: Vec<String> = (0..30)
        .map(|i| format!("00000000-0000-0000-0000-{i:012}"))
        .collect();

    let mut client = MockLogCacheClient::default();
    for (i, source_id) in sources.iter().enumerate() {
        client = client
            .with_source(
                source_id,
                Some(vec![
                    counter_envelope(source_id, "requests", i as u64, &[("app", "web")]),
                    gauge_envelope(source_id, &[("cpu", i as f64 / 2.0)], &[]),
                ]),
            )
            .with_read_delay(source_id, Duration::from_millis((i as u64 * 7) % 23));
    }
    let client = Arc::new(client);

    let config = PipelineConfig {
        fetch_workers: 4,
        convert_workers: 3,
        batch_channel_capacity: 2,
        ..PipelineConfig::default()
    };
    let (addr, shutdown) = start_server(client.clone(), config).await;

    let first = send_get_request(addr, "/metrics", &[("Authorization", TOKEN)])
        .await
        .unwrap();
    let second = send_get_request(addr, "/metrics", &[("Authorization", TOKEN)])
        .await
        .unwrap();

    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.body, second.body);
    assert_eq!(
        first.body.lines().filter(|l| l.starts_with("requests{")).count(),
        sources.len()
    );
    assert_eq!(
        first.body.lines().filter(|l| l.starts_with("cpu{")).count(),
        sources.len()
    );
    assert!(client
        .tokens_seen
        .lock()
        .unwrap()
        .iter()
        .all(|token| token == TOKEN));
    shutdown.cancel();
}
