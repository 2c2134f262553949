//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML. Every section
//! is defaulted, so an empty file is a valid (development) configuration.

use serde::{Deserialize, Serialize};

use crate::events::FailurePolicy;

/// Root configuration for the bootstrap configuration-sync service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Service identity and shutdown behaviour.
    pub service: ServiceSection,

    /// Provisioning HTTP API listener.
    pub http: HttpConfig,

    /// Optional gRPC health listener.
    pub grpc: Option<GrpcConfig>,

    /// Event stream subscription.
    pub stream: StreamConfig,

    /// API authentication.
    pub api: ApiConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceSection {
    /// Name used in logs and as the default consumer name.
    pub name: String,

    /// Per-listener graceful stop deadline in seconds.
    pub stop_timeout_secs: u64,

    /// Termination signals that trigger a graceful stop.
    pub signals: Vec<String>,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            name: "bootstrap".to_string(),
            stop_timeout_secs: 30,
            signals: vec!["SIGINT".to_string(), "SIGTERM".to_string()],
        }
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address (e.g., "0.0.0.0:8202").
    pub bind_address: String,

    /// Serve HTTPS when set.
    pub tls: Option<TlsConfig>,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8202".to_string(),
            tls: None,
            request_timeout_secs: 30,
        }
    }
}

/// gRPC listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GrpcConfig {
    pub bind_address: String,
    pub tls: Option<TlsConfig>,
}

impl Default for GrpcConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8203".to_string(),
            tls: None,
        }
    }
}

/// Certificate and key, both PEM. TLS is used only when both are present.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Event stream subscription settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamConfig {
    pub redis_url: String,

    /// Stream carrying thing and channel events.
    pub stream: String,

    /// Consumer group shared by all service instances.
    pub group: String,

    /// This instance's name within the group. Defaults to the service name.
    pub consumer: Option<String>,

    /// Entries pulled per read.
    pub batch_size: usize,

    /// How long a read may wait for new entries, in milliseconds.
    pub block_ms: u64,

    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,

    pub failure_policy: FailurePolicy,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            stream: "mainflux.things".to_string(),
            group: "mainflux.bootstrap".to_string(),
            consumer: None,
            batch_size: 100,
            block_ms: 1_000,
            backoff_base_ms: 50,
            backoff_max_ms: 5_000,
            failure_policy: FailurePolicy::AbortBatch,
        }
    }
}

/// API authentication.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Bearer key required on `/configs` routes. Unset disables the check.
    pub api_key: Option<String>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config: ServiceConfig = toml::from_str("").unwrap();
        assert_eq!(config.stream.stream, "mainflux.things");
        assert_eq!(config.stream.group, "mainflux.bootstrap");
        assert_eq!(config.stream.batch_size, 100);
        assert_eq!(config.service.stop_timeout_secs, 30);
        assert!(config.grpc.is_none());
        assert!(config.api.api_key.is_none());
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config: ServiceConfig = toml::from_str(
            r#"
            [stream]
            batch_size = 10
            failure_policy = "skip_and_continue"

            [grpc]
            bind_address = "127.0.0.1:9000"

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.stream.batch_size, 10);
        assert_eq!(config.stream.failure_policy, FailurePolicy::SkipAndContinue);
        assert_eq!(config.stream.block_ms, 1_000);
        assert_eq!(config.grpc.unwrap().bind_address, "127.0.0.1:9000");
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn unknown_failure_policy_is_rejected() {
        let result: Result<ServiceConfig, _> = toml::from_str("[stream]\nfailure_policy = \"retry\"\n");
        assert!(result.is_err());
    }
}
