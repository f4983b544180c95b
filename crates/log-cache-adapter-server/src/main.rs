// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, sync::Arc};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use log_cache_adapter::{
    config::Config, log_cache::HttpLogCacheClient, pipeline::MetricsPipeline,
    server::MetricsServer,
};

#[tokio::main]
pub async fn main() {
    let log_level = env::var("LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match Config::new() {
        Ok(c) => c,
        Err(e) => {
            error!("Error creating config on log-cache adapter startup: {e}");
            return;
        }
    };

    let client = match HttpLogCacheClient::new(
        &config.log_cache_api,
        config.proxy_url.as_deref(),
        config.upstream_timeout,
    ) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Unable to create log-cache client: {e}");
            return;
        }
    };

    let pipeline = Arc::new(MetricsPipeline::new(client, config.pipeline.clone()));
    let server = MetricsServer::new(pipeline, config.responders.clone());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Unable to listen on {addr}: {e}");
            return;
        }
    };

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Unable to listen for shutdown signal: {e}");
            return;
        }
        info!("Shutdown signal received");
        signal_token.cancel();
    });

    info!(
        "log-cache adapter started against {}, listening on {addr}",
        config.log_cache_api
    );

    if let Err(e) = server.serve(listener, shutdown).await {
        error!("Metrics server stopped: {e}");
    }
}
