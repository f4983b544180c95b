// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Fetcher workers: read the recent envelopes of each queued source.

use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::envelope::{EnvelopeBatch, EnvelopeType};
use crate::log_cache::LogCacheClient;

/// Envelope types the adapter converts
pub const FETCHED_ENVELOPE_TYPES: [EnvelopeType; 2] = [EnvelopeType::Counter, EnvelopeType::Gauge];

/// State shared by every fetcher of one request.
pub struct FetchContext {
    pub client: Arc<dyn LogCacheClient + Send + Sync>,
    pub token: Arc<str>,
    pub since: SystemTime,
}

/// Pulls source ids off `sources` until the queue is closed, reading each source once.
///
/// A failed read is logged and the source skipped. Each successful batch is sent on `batches`,
/// waiting while the channel is full.
pub async fn run_fetcher(
    ctx: Arc<FetchContext>,
    sources: Arc<Mutex<Receiver<String>>>,
    batches: Sender<EnvelopeBatch>,
    cancel: CancellationToken,
) {
    loop {
        let next = {
            let mut sources = sources.lock().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                next = sources.recv() => next,
            }
        };
        let Some(source_id) = next else {
            return;
        };

        debug!(instance_id = %source_id, "Obtaining metrics for resource");

        let read = ctx.client.read(
            &ctx.token,
            &source_id,
            ctx.since,
            &FETCHED_ENVELOPE_TYPES,
        );
        let envelopes = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            result = read => match result {
                Ok(envelopes) => envelopes,
                Err(e) => {
                    error!(instance_id = %source_id, "Failed to read envelopes, skipping source: {e}");
                    continue;
                }
            },
        };

        let batch = EnvelopeBatch {
            source_id,
            envelopes,
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            sent = batches.send(batch) => {
                if sent.is_err() {
                    debug!("Envelope batch channel closed, stopping fetcher");
                    return;
                }
            }
        }
    }
}
