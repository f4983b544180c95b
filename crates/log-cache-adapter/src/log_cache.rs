// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Client for the log-cache HTTP API.
//!
//! The client never stores a credential: every call takes the caller's `Authorization` header
//! value and forwards it unchanged, so one client (and its connection pool) serves all requests.

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::envelope::{Envelope, EnvelopeType};
use crate::errors::LogCacheError;

const META_PATH: &str = "/v1/meta";
const READ_PATH: &str = "/v1/read";

/// Metadata log-cache reports for each source; the adapter only uses the keys.
pub type SourceMeta = HashMap<String, serde_json::Value>;

#[async_trait]
pub trait LogCacheClient {
    /// Lists the source ids visible to `token`.
    async fn meta(&self, token: &str) -> Result<SourceMeta, LogCacheError>;

    /// Reads the envelopes of `source_id` emitted since `since`, restricted to `envelope_types`.
    async fn read(
        &self,
        token: &str,
        source_id: &str,
        since: SystemTime,
        envelope_types: &[EnvelopeType],
    ) -> Result<Vec<Envelope>, LogCacheError>;
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct MetaResponse {
    meta: SourceMeta,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ReadResponse {
    envelopes: EnvelopeList,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct EnvelopeList {
    batch: Vec<Envelope>,
}

#[derive(Clone, Debug)]
pub struct HttpLogCacheClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpLogCacheClient {
    pub fn new(
        base_url: &str,
        proxy_url: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, LogCacheError> {
        let base_url = base_url.trim_end_matches('/');
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(LogCacheError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self {
            base_url: base_url.to_string(),
            client: build_client(proxy_url, timeout)?,
        })
    }

    async fn get(
        &self,
        url: &str,
        token: &str,
        query: &[(&str, String)],
    ) -> Result<String, LogCacheError> {
        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, token)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(LogCacheError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl LogCacheClient for HttpLogCacheClient {
    async fn meta(&self, token: &str) -> Result<SourceMeta, LogCacheError> {
        let url = format!("{}{META_PATH}", self.base_url);
        let body = self.get(&url, token, &[]).await?;
        let response: MetaResponse = serde_json::from_str(&body)?;
        debug!("log-cache reported {} sources", response.meta.len());
        Ok(response.meta)
    }

    async fn read(
        &self,
        token: &str,
        source_id: &str,
        since: SystemTime,
        envelope_types: &[EnvelopeType],
    ) -> Result<Vec<Envelope>, LogCacheError> {
        let url = format!("{}{READ_PATH}/{source_id}", self.base_url);
        let start_time = since
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();

        let mut query = vec![("start_time", start_time.to_string())];
        query.extend(
            envelope_types
                .iter()
                .map(|t| ("envelope_types", t.as_str().to_string())),
        );

        let body = self.get(&url, token, &query).await?;
        let response: ReadResponse = serde_json::from_str(&body)?;
        Ok(response.envelopes.batch)
    }
}

/// Builds a reqwest client with optional proxy configuration and timeout.
fn build_client(
    proxy_url: Option<&str>,
    timeout: Duration,
) -> Result<reqwest::Client, LogCacheError> {
    let mut builder = reqwest::Client::builder().timeout(timeout);
    if let Some(proxy) = proxy_url {
        builder = builder.proxy(reqwest::Proxy::https(proxy)?);
    }
    Ok(builder.build()?)
}
