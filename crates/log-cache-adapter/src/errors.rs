// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types for the log-cache adapter.

use std::time::Duration;

/// Errors returned by the upstream log-cache service
#[derive(Debug, thiserror::Error)]
pub enum LogCacheError {
    #[error("log-cache request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("log-cache responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unable to decode log-cache response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid log-cache URL: {0}")]
    InvalidUrl(String),
}

/// Errors raised while turning envelopes into metric families
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConvertError {
    #[error("envelope is missing a source id")]
    MissingSourceId,

    #[error("envelope from source {source_id} has an empty metric name")]
    EmptyMetricName { source_id: String },
}

/// Errors raised while merging metric families into a collection
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MergeError {
    #[error("metric {name} reported as both {existing} and {incoming}")]
    KindMismatch {
        name: String,
        existing: &'static str,
        incoming: &'static str,
    },
}

/// Request level failures of the aggregation pipeline
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("unable to discover log-cache sources: {0}")]
    Discovery(#[source] LogCacheError),

    #[error("unable to convert envelopes from source {source_id}: {error}")]
    Conversion {
        source_id: String,
        #[source]
        error: ConvertError,
    },

    #[error("unable to merge metric families: {0}")]
    Merge(#[from] MergeError),

    #[error("pipeline worker failed: {0}")]
    WorkerFailed(String),

    #[error("pipeline timed out after {0:?}")]
    Timeout(Duration),

    #[error("pipeline cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Message written to the client when this error ends a request.
    pub fn client_message(&self) -> &'static str {
        match self {
            Self::Discovery(_) => "Cannot connect to log-cache",
            Self::Conversion { .. } | Self::Merge(_) => {
                "Error converting log-cache metrics to prometheus format"
            }
            Self::Timeout(_) => "Timed out collecting metrics from log-cache",
            Self::WorkerFailed(_) | Self::Cancelled => "Internal server error",
        }
    }
}

/// Errors that can occur while loading the adapter configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is not set")]
    MissingVar(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
