// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Prometheus shaped metric families and the conversion from loggregator envelopes.

use crate::envelope::{Envelope, EnvelopeBatch};
use crate::errors::ConvertError;
use std::collections::BTreeMap;
use tracing::trace;

/// Label carrying the source id of every sample
pub const INSTANCE_ID_LABEL: &str = "instance_id";

/// Label names to values. Ordered so that a label set can key a sample and encodes sorted.
pub type Labels = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
        }
    }
}

/// All samples of one metric name.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    pub name: String,
    pub kind: MetricKind,
    pub samples: BTreeMap<Labels, f64>,
}

impl MetricFamily {
    pub fn new(name: impl Into<String>, kind: MetricKind) -> Self {
        Self {
            name: name.into(),
            kind,
            samples: BTreeMap::new(),
        }
    }

    /// Records a sample, replacing any previous value for the same label set.
    pub fn insert(&mut self, labels: Labels, value: f64) {
        self.samples.insert(labels, value);
    }
}

/// Replaces every character outside `[a-zA-Z0-9_:]` with `_` and prefixes a leading digit.
pub fn sanitize_metric_name(name: &str) -> String {
    sanitize(name, |c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// Replaces every character outside `[a-zA-Z0-9_]` with `_` and prefixes a leading digit.
pub fn sanitize_label_name(name: &str) -> String {
    sanitize(name, |c| c.is_ascii_alphanumeric() || c == '_')
}

fn sanitize(name: &str, allowed: impl Fn(char) -> bool) -> String {
    let mut sanitized = String::with_capacity(name.len() + 1);
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        sanitized.push('_');
    }
    sanitized.extend(name.chars().map(|c| if allowed(c) { c } else { '_' }));
    sanitized
}

fn labels_for(envelope: &Envelope) -> Labels {
    // tags are iterated in key order, so of two keys that sanitize alike the later one wins
    let mut labels: Labels = envelope
        .tags
        .iter()
        .map(|(key, value)| (sanitize_label_name(key), value.clone()))
        .collect();
    labels.insert(INSTANCE_ID_LABEL.to_string(), envelope.source_id.clone());
    labels
}

fn family_mut<'a>(
    families: &'a mut Vec<MetricFamily>,
    name: String,
    kind: MetricKind,
) -> &'a mut MetricFamily {
    let position = families
        .iter()
        .position(|family| family.name == name && family.kind == kind);
    match position {
        Some(index) => &mut families[index],
        None => {
            families.push(MetricFamily::new(name, kind));
            let last = families.len() - 1;
            &mut families[last]
        }
    }
}

/// Converts one batch into metric families.
///
/// Counters yield one sample valued at their cumulative total, as an `f64`, so totals above 2^53
/// lose precision. Gauges yield one sample per metric in the envelope. Other envelope types are
/// ignored.
pub fn convert(batch: &EnvelopeBatch) -> Result<Vec<MetricFamily>, ConvertError> {
    let mut families = Vec::new();

    for envelope in &batch.envelopes {
        if envelope.counter.is_none() && envelope.gauge.is_none() {
            trace!(
                "Skipping envelope without counter or gauge from {}",
                batch.source_id
            );
            continue;
        }
        if envelope.source_id.is_empty() {
            return Err(ConvertError::MissingSourceId);
        }

        let labels = labels_for(envelope);

        if let Some(counter) = &envelope.counter {
            let name = checked_name(&counter.name, envelope)?;
            family_mut(&mut families, name, MetricKind::Counter)
                .insert(labels.clone(), counter.total as f64);
        }

        if let Some(gauge) = &envelope.gauge {
            for (metric_name, gauge_value) in &gauge.metrics {
                let name = checked_name(metric_name, envelope)?;
                family_mut(&mut families, name, MetricKind::Gauge)
                    .insert(labels.clone(), gauge_value.value);
            }
        }
    }

    Ok(families)
}

fn checked_name(name: &str, envelope: &Envelope) -> Result<String, ConvertError> {
    if name.is_empty() {
        return Err(ConvertError::EmptyMetricName {
            source_id: envelope.source_id.clone(),
        });
    }
    Ok(sanitize_metric_name(name))
}
