// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Loggregator v2 envelopes as returned by the log-cache read API.
//!
//! Log-cache serialises envelopes as protobuf JSON, so 64-bit integers may arrive as strings and
//! non-finite doubles as `"NaN"` / `"Infinity"`. The deserialisers below accept both encodings.

use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::fmt;

/// Envelope types requested from the read API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeType {
    Counter,
    Gauge,
}

impl EnvelopeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Counter => "COUNTER",
            Self::Gauge => "GAUGE",
        }
    }
}

impl fmt::Display for EnvelopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Envelope {
    #[serde(deserialize_with = "deserialize_i64")]
    pub timestamp: i64,
    pub source_id: String,
    pub instance_id: String,
    pub tags: BTreeMap<String, String>,
    pub counter: Option<Counter>,
    pub gauge: Option<Gauge>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Counter {
    pub name: String,
    #[serde(deserialize_with = "deserialize_u64")]
    pub delta: u64,
    #[serde(deserialize_with = "deserialize_u64")]
    pub total: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Gauge {
    pub metrics: BTreeMap<String, GaugeValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GaugeValue {
    pub unit: String,
    #[serde(deserialize_with = "deserialize_f64")]
    pub value: f64,
}

/// The envelopes returned by one read call for one source.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvelopeBatch {
    pub source_id: String,
    pub envelopes: Vec<Envelope>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString<T> {
    Number(T),
    String(String),
}

fn deserialize_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    match NumberOrString::<u64>::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

fn deserialize_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match NumberOrString::<i64>::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

fn deserialize_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    match NumberOrString::<f64>::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => match s.as_str() {
            "NaN" => Ok(f64::NAN),
            "Infinity" => Ok(f64::INFINITY),
            "-Infinity" => Ok(f64::NEG_INFINITY),
            other => other.parse().map_err(serde::de::Error::custom),
        },
    }
}
