// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP front end serving the `/metrics` endpoint.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use hyper::service::service_fn;
use hyper::{http, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::io;
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::pipeline::MetricsPipeline;

pub const METRICS_ENDPOINT_PATH: &str = "/metrics";

pub type HttpResponse = Response<Full<Bytes>>;

/// Maps an accepted media type to the content type written back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Responder {
    pub accept: String,
    pub content_type: String,
}

impl Responder {
    pub fn new(accept: &str, content_type: &str) -> Self {
        Self {
            accept: accept.to_string(),
            content_type: content_type.to_string(),
        }
    }
}

pub fn default_responders() -> Vec<Responder> {
    vec![Responder::new("text/plain", crate::exposition::CONTENT_TYPE)]
}

pub struct MetricsServer {
    pipeline: Arc<MetricsPipeline>,
    responders: Arc<Vec<Responder>>,
}

impl MetricsServer {
    pub fn new(pipeline: Arc<MetricsPipeline>, responders: Vec<Responder>) -> Self {
        Self {
            pipeline,
            responders: Arc::new(responders),
        }
    }

    /// Serves connections from `listener` until `shutdown` is cancelled.
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let pipeline = Arc::clone(&self.pipeline);
        let responders = Arc::clone(&self.responders);
        let service = service_fn(move |req: Request<Incoming>| {
            let pipeline = Arc::clone(&pipeline);
            let responders = Arc::clone(&responders);
            handle_request(pipeline, responders, req)
        });

        if let Ok(addr) = listener.local_addr() {
            info!("Serving {METRICS_ENDPOINT_PATH} on {addr}");
        }

        let server = hyper::server::conn::http1::Builder::new();
        let mut joinset = JoinSet::new();

        loop {
            let conn = tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Shutting down metrics server");
                    joinset.abort_all();
                    return Ok(());
                },
                con_res = listener.accept() => match con_res {
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::ConnectionAborted
                                | io::ErrorKind::ConnectionReset
                                | io::ErrorKind::ConnectionRefused
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => {
                        error!("Server error: {e}");
                        return Err(e.into());
                    }
                    Ok((conn, _)) => conn,
                },
                finished = async {
                    match joinset.join_next().await {
                        Some(finished) => finished,
                        None => std::future::pending().await,
                    }
                } => match finished {
                    Err(e) if e.is_panic() => {
                        error!("Connection handler panicked: {:?}", e);
                        continue;
                    },
                    Ok(()) | Err(_) => continue,
                },
            };
            let conn = TokioIo::new(conn);
            let server = server.clone();
            let service = service.clone();
            joinset.spawn(async move {
                if let Err(e) = server.serve_connection(conn, service).await {
                    error!("Connection error: {e}");
                }
            });
        }
    }
}

async fn handle_request<B>(
    pipeline: Arc<MetricsPipeline>,
    responders: Arc<Vec<Responder>>,
    req: Request<B>,
) -> http::Result<HttpResponse> {
    if req.uri().path() != METRICS_ENDPOINT_PATH {
        return text_response(StatusCode::NOT_FOUND, "text/plain", "Not found");
    }
    if req.method() != Method::GET {
        return text_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "text/plain",
            "Method not allowed",
        );
    }

    let token = match req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
    {
        Some(token) => token.to_string(),
        None => return text_response(StatusCode::UNAUTHORIZED, "text/plain", "Unauthorized"),
    };

    let accept = req.headers().get(ACCEPT).and_then(|v| v.to_str().ok());
    let Some(responder) = negotiate(accept, &responders) else {
        return text_response(
            StatusCode::NOT_ACCEPTABLE,
            "text/plain",
            "Not acceptable",
        );
    };

    // cancels the pipeline if hyper drops this future because the client went away
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let started = Instant::now();
    let result = pipeline
        .produce_metrics(&token, SystemTime::now(), cancel)
        .await;
    debug!(
        "Time taken to produce metrics: {} ms",
        started.elapsed().as_millis()
    );

    match result {
        Ok(body) => text_response(StatusCode::OK, &responder.content_type, body),
        Err(e) => {
            error!("Failed to produce metrics: {e}");
            text_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "text/plain",
                e.client_message(),
            )
        }
    }
}

/// Picks the responder for an `Accept` header value.
///
/// A missing header accepts anything. Media ranges may use `*/*` or `type/*`; parameters such as
/// `q` are ignored and ranges are tried in the order listed.
pub fn negotiate<'a>(accept: Option<&str>, responders: &'a [Responder]) -> Option<&'a Responder> {
    let Some(accept) = accept.filter(|a| !a.trim().is_empty()) else {
        return responders.first();
    };

    accept
        .split(',')
        .filter_map(|range| range.split(';').next())
        .map(str::trim)
        .find_map(|range| {
            responders
                .iter()
                .find(|responder| media_range_matches(range, &responder.accept))
        })
}

fn media_range_matches(range: &str, media_type: &str) -> bool {
    if range == "*/*" || range.eq_ignore_ascii_case(media_type) {
        return true;
    }
    match (range.strip_suffix("/*"), media_type.split_once('/')) {
        (Some(range_type), Some((main_type, _))) => range_type.eq_ignore_ascii_case(main_type),
        _ => false,
    }
}

fn text_response(
    status: StatusCode,
    content_type: &str,
    body: impl Into<Bytes>,
) -> http::Result<HttpResponse> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, content_type)
        .body(Full::new(body.into()))
}
