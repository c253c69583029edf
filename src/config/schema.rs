//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gate.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::config::target::{BackendTarget, TargetError};

/// Root configuration for the auth gate.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GateConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// The auth backend consulted for every request.
    pub auth_request: AuthRequestConfig,

    /// Where allowed requests are forwarded by the bundled server.
    pub upstream: UpstreamConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
            max_connections: 10_000,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Auth backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AuthRequestConfig {
    /// Backend URL, e.g. "http://127.0.0.1:2015". Required.
    pub backend: Option<String>,
}

impl AuthRequestConfig {
    /// Parse the configured backend. `None` when no backend is set; that case
    /// is reported by validation.
    pub fn target(&self) -> Option<Result<BackendTarget, TargetError>> {
        self.backend.as_deref().map(str::parse)
    }
}

/// Downstream forwarding for the bundled server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Upstream URL. Without one, allowed requests get `204 No Content`.
    pub address: Option<String>,
}

impl UpstreamConfig {
    pub fn target(&self) -> Option<Result<BackendTarget, TargetError>> {
        self.address.as_deref().map(str::parse)
    }
}

/// Timeout configuration for backend exchanges.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Time allowed for a backend to answer with response headers, in seconds.
    pub request_secs: u64,

    /// Idle pooled connection timeout in seconds.
    pub idle_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
            idle_secs: 60,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
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
    /// Log output format.
    pub log_format: LogFormat,

    /// Default log filter, overridden by `RUST_LOG`.
    pub log_filter: String,

    /// Enable Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
            log_filter: "auth_gate=info,tower_http=info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config: GateConfig = toml::from_str(
            r#"
            [auth_request]
            backend = "http://127.0.0.1:2015"
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.timeouts.request_secs, 30);
        assert_eq!(config.observability.log_format, LogFormat::Pretty);
        assert!(config.upstream.address.is_none());
        assert_eq!(
            config.auth_request.target().unwrap().unwrap().to_string(),
            "http://127.0.0.1:2015"
        );
    }

    #[test]
    fn full_config_parses() {
        let config: GateConfig = toml::from_str(
            r#"
            [listener]
            bind_address = "127.0.0.1:8443"
            max_connections = 64

            [listener.tls]
            cert_path = "certs/gate.pem"
            key_path = "certs/gate.key"

            [auth_request]
            backend = "http://auth:9000"

            [upstream]
            address = "http://app:3000"

            [timeouts]
            connect_secs = 1
            request_secs = 2
            idle_secs = 3

            [observability]
            log_format = "json"
            metrics_enabled = true
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.max_connections, 64);
        assert_eq!(config.listener.tls.unwrap().key_path, "certs/gate.key");
        assert_eq!(config.timeouts.idle_secs, 3);
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.observability.metrics_address, "0.0.0.0:9090");
        assert!(config.upstream.target().unwrap().is_ok());
    }

    #[test]
    fn missing_backend_has_no_target() {
        let config = GateConfig::default();
        assert!(config.auth_request.target().is_none());
    }
}
