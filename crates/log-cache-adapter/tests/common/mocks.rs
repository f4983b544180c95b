// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mock log-cache client for testing the pipeline without a network

use async_trait::async_trait;
use log_cache_adapter::envelope::{Counter, Envelope, EnvelopeType, Gauge, GaugeValue};
use log_cache_adapter::errors::LogCacheError;
use log_cache_adapter::log_cache::{LogCacheClient, SourceMeta};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

/// Serves canned envelopes per source. A source mapped to `None` fails its read.
#[derive(Default)]
pub struct MockLogCacheClient {
    pub sources: HashMap<String, Option<Vec<Envelope>>>,
    /// delay applied to the read of a source, to shuffle completion order
    pub read_delays: HashMap<String, Duration>,
    pub tokens_seen: Mutex<Vec<String>>,
}

impl MockLogCacheClient {
    pub fn with_source(mut self, source_id: &str, envelopes: Option<Vec<Envelope>>) -> Self {
        self.sources.insert(source_id.to_string(), envelopes);
        self
    }

    pub fn with_read_delay(mut self, source_id: &str, delay: Duration) -> Self {
        self.read_delays.insert(source_id.to_string(), delay);
        self
    }
}

#[async_trait]
impl LogCacheClient for MockLogCacheClient {
    async fn meta(&self, token: &str) -> Result<SourceMeta, LogCacheError> {
        self.tokens_seen.lock().unwrap().push(token.to_string());
        Ok(self
            .sources
            .keys()
            .map(|id| (id.clone(), serde_json::Value::Null))
            .collect())
    }

    async fn read(
        &self,
        token: &str,
        source_id: &str,
        _since: SystemTime,
        _envelope_types: &[EnvelopeType],
    ) -> Result<Vec<Envelope>, LogCacheError> {
        self.tokens_seen.lock().unwrap().push(token.to_string());
        if let Some(delay) = self.read_delays.get(source_id) {
            tokio::time::sleep(*delay).await;
        }
        match self.sources.get(source_id) {
            Some(Some(envelopes)) => Ok(envelopes.clone()),
            _ => Err(LogCacheError::Status {
                status: 500,
                body: format!("no data for {source_id}"),
            }),
        }
    }
}

pub fn counter_envelope(source_id: &str, name: &str, total: u64, tags: &[(&str, &str)]) -> Envelope {
    Envelope {
        source_id: source_id.to_string(),
        tags: to_tags(tags),
        counter: Some(Counter {
            name: name.to_string(),
            delta: 0,
            total,
        }),
        ..Default::default()
    }
}

pub fn gauge_envelope(source_id: &str, metrics: &[(&str, f64)], tags: &[(&str, &str)]) -> Envelope {
    Envelope {
        source_id: source_id.to_string(),
        tags: to_tags(tags),
        gauge: Some(Gauge {
            metrics: metrics
                .iter()
                .map(|(name, value)| {
                    (
                        name.to_string(),
                        GaugeValue {
                            unit: String::new(),
                            value: *value,
                        },
                    )
                })
                .collect(),
        }),
        ..Default::default()
    }
}

fn to_tags(tags: &[(&str, &str)]) -> BTreeMap<String, String> {
    tags.iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
