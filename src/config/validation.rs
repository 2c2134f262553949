//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, URLs and value ranges
//! - Resolve signal names before the service starts
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - TLS files are checked when a listener starts, not here

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::{ServiceConfig, TlsConfig};
use crate::lifecycle::SignalSet;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const REDIS_SCHEMES: [&str; 3] = ["redis", "rediss", "redis+unix"];

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: must not be empty")]
    Empty { field: &'static str },

    #[error("{field}: must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("stream.redis_url: {0}")]
    InvalidRedisUrl(String),

    #[error("service.signals: {0}")]
    InvalidSignal(String),

    #[error("stream.backoff_base_ms ({base}) exceeds stream.backoff_max_ms ({max})")]
    BackoffRange { base: u64, max: u64 },

    #[error("observability.log_level: unknown level {0:?}")]
    InvalidLogLevel(String),
}

/// Check a parsed configuration.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.service.name.trim().is_empty() {
        errors.push(ValidationError::Empty { field: "service.name" });
    }
    if config.service.stop_timeout_secs == 0 {
        errors.push(ValidationError::Zero { field: "service.stop_timeout_secs" });
    }
    match SignalSet::parse(&config.service.signals) {
        Ok(set) if set.is_empty() => errors.push(ValidationError::Empty { field: "service.signals" }),
        Ok(_) => {}
        Err(e) => errors.push(ValidationError::InvalidSignal(e.to_string())),
    }

    check_address(&mut errors, "http.bind_address", &config.http.bind_address);
    check_tls(&mut errors, "http.tls", config.http.tls.as_ref());
    if config.http.request_timeout_secs == 0 {
        errors.push(ValidationError::Zero { field: "http.request_timeout_secs" });
    }

    if let Some(grpc) = &config.grpc {
        check_address(&mut errors, "grpc.bind_address", &grpc.bind_address);
        check_tls(&mut errors, "grpc.tls", grpc.tls.as_ref());
    }

    let stream = &config.stream;
    match Url::parse(&stream.redis_url) {
        Ok(url) if REDIS_SCHEMES.contains(&url.scheme()) => {}
        Ok(url) => errors.push(ValidationError::InvalidRedisUrl(format!(
            "unsupported scheme {:?}",
            url.scheme()
        ))),
        Err(e) => errors.push(ValidationError::InvalidRedisUrl(e.to_string())),
    }
    if stream.stream.is_empty() {
        errors.push(ValidationError::Empty { field: "stream.stream" });
    }
    if stream.group.is_empty() {
        errors.push(ValidationError::Empty { field: "stream.group" });
    }
    if stream.consumer.as_deref().is_some_and(str::is_empty) {
        errors.push(ValidationError::Empty { field: "stream.consumer" });
    }
    if stream.batch_size == 0 {
        errors.push(ValidationError::Zero { field: "stream.batch_size" });
    }
    if stream.backoff_base_ms == 0 {
        errors.push(ValidationError::Zero { field: "stream.backoff_base_ms" });
    }
    if stream.backoff_base_ms > stream.backoff_max_ms {
        errors.push(ValidationError::BackoffRange {
            base: stream.backoff_base_ms,
            max: stream.backoff_max_ms,
        });
    }

    if config.api.api_key.as_deref().is_some_and(|k| k.trim().is_empty()) {
        errors.push(ValidationError::Empty { field: "api.api_key" });
    }

    let observability = &config.observability;
    if !LOG_LEVELS.contains(&observability.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::InvalidLogLevel(observability.log_level.clone()));
    }
    if observability.metrics_enabled {
        check_address(&mut errors, "observability.metrics_address", &observability.metrics_address);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

fn check_tls(errors: &mut Vec<ValidationError>, field: &'static str, tls: Option<&TlsConfig>) {
    if let Some(tls) = tls {
        if tls.cert_path.is_empty() || tls.key_path.is_empty() {
            errors.push(ValidationError::Empty { field });
        }
    }
}
