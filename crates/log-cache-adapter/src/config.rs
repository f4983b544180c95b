// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::ConfigError;
use crate::pipeline::{
    default_convert_workers, PipelineConfig, DEFAULT_FETCH_WORKERS, DEFAULT_READ_WINDOW,
    DEFAULT_REQUEST_TIMEOUT, ENVELOPE_BATCH_CHANNEL_BUFFER_SIZE, SOURCE_QUEUE_BUFFER_SIZE,
};
use crate::server::{default_responders, Responder};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);
const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the log-cache API, e.g. `https://log-cache.example.com`
    pub log_cache_api: String,
    pub host: String,
    pub port: u16,
    pub log_level: String,
    /// timeout for each log-cache request
    pub upstream_timeout: Duration,
    pub proxy_url: Option<String>,
    pub pipeline: PipelineConfig,
    pub responders: Vec<Responder>,
}

impl Config {
    pub fn new() -> Result<Config, ConfigError> {
        let log_cache_api = env::var("LOG_CACHE_API")
            .map_err(|_| ConfigError::MissingVar("LOG_CACHE_API"))?
            .trim()
            .trim_end_matches('/')
            .to_string();

        let config = Config {
            log_cache_api,
            host: env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string()),
            port: parse_var("PORT")?.unwrap_or(DEFAULT_PORT),
            log_level: env::var("LOG_LEVEL")
                .map(|val| val.to_lowercase())
                .unwrap_or_else(|_| "info".to_string()),
            upstream_timeout: parse_var("UPSTREAM_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT),
            proxy_url: env::var("HTTPS_PROXY").ok(),
            pipeline: PipelineConfig {
                fetch_workers: parse_var("FETCH_WORKERS")?.unwrap_or(DEFAULT_FETCH_WORKERS),
                convert_workers: parse_var("CONVERT_WORKERS")?
                    .unwrap_or_else(default_convert_workers),
                read_window: parse_var("READ_WINDOW_SECS")?
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_READ_WINDOW),
                source_queue_capacity: SOURCE_QUEUE_BUFFER_SIZE,
                batch_channel_capacity: ENVELOPE_BATCH_CHANNEL_BUFFER_SIZE,
                request_timeout: parse_var("REQUEST_TIMEOUT_SECS")?
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            },
            responders: default_responders(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.log_cache_api.starts_with("http://") || self.log_cache_api.starts_with("https://"))
        {
            return Err(ConfigError::InvalidConfig(format!(
                "LOG_CACHE_API must be an http or https URL, got '{}'",
                self.log_cache_api
            )));
        }

        if self.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "PORT must be greater than 0".to_string(),
            ));
        }

        if self.pipeline.fetch_workers == 0 || self.pipeline.convert_workers == 0 {
            return Err(ConfigError::InvalidConfig(
                "FETCH_WORKERS and CONVERT_WORKERS must be greater than 0".to_string(),
            ));
        }

        if self.pipeline.request_timeout.is_zero() || self.upstream_timeout.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "REQUEST_TIMEOUT_SECS and UPSTREAM_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }
}

fn parse_var<T: FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(val) => val.trim().parse::<T>().map(Some).map_err(|_| {
            ConfigError::InvalidConfig(format!("{name} has an invalid value '{val}'"))
        }),
        Err(_) => Ok(None),
    }
}
