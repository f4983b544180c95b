// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Serves the counter and gauge envelopes held by log-cache as a Prometheus metrics endpoint.
//!
//! Each scrape of `/metrics` runs a [`pipeline::MetricsPipeline`] with the scraper's bearer token:
//! the sources visible to that token are discovered, their last ten minutes of envelopes are read
//! in parallel, converted to metric families and merged into a single exposition document.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod aggregator;
pub mod config;
pub mod converter;
pub mod envelope;
pub mod errors;
pub mod exposition;
pub mod fetcher;
pub mod log_cache;
pub mod metric;
pub mod pipeline;
pub mod server;
pub mod source;
