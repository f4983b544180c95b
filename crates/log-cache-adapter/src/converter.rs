// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Converter workers: turn envelope batches into metric families.

use std::sync::Arc;
use tokio::sync::mpsc::Receiver;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::aggregator::MetricsCollection;
use crate::envelope::EnvelopeBatch;
use crate::errors::PipelineError;
use crate::metric::convert;

/// Converts batches from `batches` until the channel is closed and returns everything the worker
/// merged.
///
/// A conversion or merge failure cancels `cancel`, stopping the rest of the pipeline, and is
/// returned to the caller. A worker stopped by cancellation returns [`PipelineError::Cancelled`].
pub async fn run_converter(
    batches: Arc<Mutex<Receiver<EnvelopeBatch>>>,
    cancel: CancellationToken,
) -> Result<MetricsCollection, PipelineError> {
    let mut collection = MetricsCollection::new();

    loop {
        let next = {
            let mut batches = batches.lock().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                next = batches.recv() => next,
            }
        };
        let Some(batch) = next else {
            debug!(
                "Converter finished with {} metric families",
                collection.len()
            );
            return Ok(collection);
        };

        if let Err(e) = merge_batch(&mut collection, &batch) {
            error!("Error converting log-cache metrics to prometheus format: {e}");
            cancel.cancel();
            return Err(e);
        }
    }
}

fn merge_batch(
    collection: &mut MetricsCollection,
    batch: &EnvelopeBatch,
) -> Result<(), PipelineError> {
    let families = convert(batch).map_err(|error| PipelineError::Conversion {
        source_id: batch.source_id.clone(),
        error,
    })?;
    collection.append(families)?;
    Ok(())
}
