// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Accumulates metric families across batches.
//!
//! Every converter worker owns a [`MetricsCollection`] and appends the batches it converts; the
//! pipeline merges the per-worker collections once all workers have exited. Merging is
//! commutative, so the final content does not depend on the order batches were processed in.

use crate::errors::MergeError;
use crate::exposition;
use crate::metric::MetricFamily;
use std::collections::BTreeMap;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct MetricsCollection {
    families: BTreeMap<String, MetricFamily>,
}

impl MetricsCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends families into the collection.
    ///
    /// Either every family is merged or, on a kind mismatch, the collection is left untouched.
    pub fn append(&mut self, families: Vec<MetricFamily>) -> Result<(), MergeError> {
        for family in &families {
            self.check_kind(family)?;
        }
        // a batch may repeat a name under two kinds
        let mut incoming: BTreeMap<&str, &MetricFamily> = BTreeMap::new();
        for family in &families {
            if let Some(previous) = incoming.insert(family.name.as_str(), family) {
                if previous.kind != family.kind {
                    return Err(kind_mismatch(previous, family));
                }
            }
        }

        for family in families {
            self.insert_family(family);
        }
        Ok(())
    }

    /// Folds another collection into this one.
    pub fn merge(&mut self, other: MetricsCollection) -> Result<(), MergeError> {
        self.append(other.families.into_values().collect())
    }

    fn check_kind(&self, family: &MetricFamily) -> Result<(), MergeError> {
        match self.families.get(&family.name) {
            Some(existing) if existing.kind != family.kind => {
                Err(kind_mismatch(existing, family))
            }
            _ => Ok(()),
        }
    }

    fn insert_family(&mut self, family: MetricFamily) {
        match self.families.get_mut(&family.name) {
            Some(existing) => existing.samples.extend(family.samples),
            None => {
                self.families.insert(family.name.clone(), family);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&MetricFamily> {
        self.families.get(name)
    }

    /// Families in name order
    pub fn families(&self) -> impl Iterator<Item = &MetricFamily> {
        self.families.values()
    }

    pub fn len(&self) -> usize {
        self.families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    pub fn sample_count(&self) -> usize {
        self.families.values().map(|f| f.samples.len()).sum()
    }

    /// Renders the collection in the Prometheus text exposition format.
    pub fn to_exposition(&self) -> String {
        exposition::encode(self.families())
    }
}

fn kind_mismatch(existing: &MetricFamily, incoming: &MetricFamily) -> MergeError {
    MergeError::KindMismatch {
        name: incoming.name.clone(),
        existing: existing.kind.as_str(),
        incoming: incoming.kind.as_str(),
    }
}
