// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-request aggregation pipeline.
//!
//! One call to [`MetricsPipeline::produce_metrics`] discovers the sources visible to the caller,
//! fans their ids out to a pool of fetchers, fans the fetched batches into a pool of converters and
//! merges the converters' collections once both pools have drained:
//!
//! ```text
//! meta -> source queue -> fetchers -> batch channel (bounded) -> converters -> merge -> encode
//! ```
//!
//! Shutdown closes the source queue, waits for every fetcher, closes the batch channel and waits
//! for every converter, in that order. Workers live in [`JoinSet`]s, so dropping the request
//! future aborts anything still in flight.

use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::aggregator::MetricsCollection;
use crate::converter::run_converter;
use crate::envelope::EnvelopeBatch;
use crate::errors::PipelineError;
use crate::fetcher::{run_fetcher, FetchContext};
use crate::log_cache::LogCacheClient;
use crate::source::is_eligible;

pub const DEFAULT_FETCH_WORKERS: usize = 10;
pub const DEFAULT_READ_WINDOW: Duration = Duration::from_secs(10 * 60);
pub const SOURCE_QUEUE_BUFFER_SIZE: usize = 100;
pub const ENVELOPE_BATCH_CHANNEL_BUFFER_SIZE: usize = 10;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub fetch_workers: usize,
    /// defaults to the available parallelism
    pub convert_workers: usize,
    /// how far back each read reaches
    pub read_window: Duration,
    pub source_queue_capacity: usize,
    /// bound on fetched batches awaiting conversion
    pub batch_channel_capacity: usize,
    pub request_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch_workers: DEFAULT_FETCH_WORKERS,
            convert_workers: default_convert_workers(),
            read_window: DEFAULT_READ_WINDOW,
            source_queue_capacity: SOURCE_QUEUE_BUFFER_SIZE,
            batch_channel_capacity: ENVELOPE_BATCH_CHANNEL_BUFFER_SIZE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

pub fn default_convert_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

pub struct MetricsPipeline {
    client: Arc<dyn LogCacheClient + Send + Sync>,
    config: PipelineConfig,
}

impl MetricsPipeline {
    pub fn new(client: Arc<dyn LogCacheClient + Send + Sync>, config: PipelineConfig) -> Self {
        Self { client, config }
    }

    /// Aggregates the last read window of every source visible to `token` and renders it in the
    /// Prometheus text format.
    ///
    /// Returns exactly one outcome: the complete document, or the error that ended the request.
    /// Sources whose read fails are left out of the document. Cancelling `cancel` stops the
    /// pipeline with [`PipelineError::Cancelled`].
    pub async fn produce_metrics(
        &self,
        token: &str,
        now: SystemTime,
        cancel: CancellationToken,
    ) -> Result<String, PipelineError> {
        let timeout = self.config.request_timeout;
        match tokio::time::timeout(timeout, self.aggregate(token, now, cancel)).await {
            Ok(result) => result.map(|collection| collection.to_exposition()),
            Err(_) => {
                error!("Collecting metrics timed out after {timeout:?}");
                Err(PipelineError::Timeout(timeout))
            }
        }
    }

    /// Runs the pipeline and returns the merged collection.
    pub async fn aggregate(
        &self,
        token: &str,
        now: SystemTime,
        cancel: CancellationToken,
    ) -> Result<MetricsCollection, PipelineError> {
        let meta = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            meta = self.client.meta(token) => meta.map_err(|e| {
                error!("Unable to list log-cache sources: {e}");
                PipelineError::Discovery(e)
            })?,
        };
        debug!("Discovered {} log-cache sources", meta.len());

        // internal failures cancel `abort` without touching the caller's token
        let abort = cancel.child_token();

        let (source_tx, source_rx): (Sender<String>, Receiver<String>) =
            mpsc::channel(self.config.source_queue_capacity.max(1));
        let (batch_tx, batch_rx): (Sender<EnvelopeBatch>, Receiver<EnvelopeBatch>) =
            mpsc::channel(self.config.batch_channel_capacity.max(1));

        let fetch_ctx = Arc::new(FetchContext {
            client: Arc::clone(&self.client),
            token: Arc::from(token),
            since: now.checked_sub(self.config.read_window).unwrap_or(now),
        });
        let source_rx = Arc::new(Mutex::new(source_rx));
        let mut fetchers = JoinSet::new();
        for _ in 0..self.config.fetch_workers.max(1) {
            fetchers.spawn(run_fetcher(
                Arc::clone(&fetch_ctx),
                Arc::clone(&source_rx),
                batch_tx.clone(),
                abort.clone(),
            ));
        }
        drop(source_rx);

        let batch_rx = Arc::new(Mutex::new(batch_rx));
        let mut converters = JoinSet::new();
        for _ in 0..self.config.convert_workers.max(1) {
            converters.spawn(run_converter(Arc::clone(&batch_rx), abort.clone()));
        }
        drop(batch_rx);

        let mut dispatched = 0usize;
        for source_id in meta.into_keys().filter(|id| is_eligible(id)) {
            tokio::select! {
                biased;
                _ = abort.cancelled() => break,
                sent = source_tx.send(source_id) => {
                    if sent.is_err() {
                        break;
                    }
                    dispatched += 1;
                }
            }
        }
        // no more sources
        drop(source_tx);
        debug!("Dispatched {dispatched} eligible sources");

        let mut worker_failure = None;
        while let Some(joined) = fetchers.join_next().await {
            if let Err(e) = joined {
                error!("Fetcher worker failed: {e}");
                abort.cancel();
                if worker_failure.is_none() {
                    worker_failure = Some(PipelineError::WorkerFailed(e.to_string()));
                }
            }
        }
        // every fetcher has exited, so nothing can send after this
        drop(batch_tx);

        let mut partials = Vec::new();
        let mut conversion_failure = None;
        while let Some(joined) = converters.join_next().await {
            match joined {
                Ok(Ok(collection)) => partials.push(collection),
                Ok(Err(PipelineError::Cancelled)) => {}
                Ok(Err(e)) => {
                    if conversion_failure.is_none() {
                        conversion_failure = Some(e);
                    }
                }
                Err(e) => {
                    error!("Converter worker failed: {e}");
                    abort.cancel();
                    if worker_failure.is_none() {
                        worker_failure = Some(PipelineError::WorkerFailed(e.to_string()));
                    }
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        if let Some(e) = conversion_failure.or(worker_failure) {
            return Err(e);
        }

        let mut metrics = MetricsCollection::new();
        for partial in partials {
            metrics.merge(partial).map_err(|e| {
                error!("Error converting log-cache metrics to prometheus format: {e}");
                PipelineError::Merge(e)
            })?;
        }
        debug!(
            "Aggregated {} metric families with {} samples",
            metrics.len(),
            metrics.sample_count()
        );
        Ok(metrics)
    }
}
