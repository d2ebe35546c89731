//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the interceptor.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::ogc::{Direction, OperationType, ServiceType};

/// Root configuration for the interceptor.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
#[serde(default)]
pub struct InterceptorConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Backend geospatial server(s).
    pub upstream: UpstreamConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Rule storage.
    pub rules: RulesConfig,

    /// Administrative rule API.
    pub admin: AdminConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Declarative interception handlers.
    pub handlers: Vec<HandlerConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum buffered body size, for requests and responses alike.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

/// A namespace served by its own backend URL.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct NamespaceConfig {
    /// Namespace (workspace) name, compared case-insensitively.
    pub namespace: String,

    /// OWS URL of the backend serving it.
    pub url: String,
}

/// Backend selection and header handling.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct UpstreamConfig {
    /// OWS URL used when no namespace binding applies.
    pub default_ows_url: Option<String>,

    /// Route calls by the namespace of their endpoint.
    pub namespace_bound_url: bool,

    /// Namespace → URL bindings, used when `namespace_bound_url` is set.
    pub namespaces: Vec<NamespaceConfig>,

    /// Request header whose value is forwarded as `Authorization`.
    pub credentials_header: String,

    /// Backend response headers returned to the caller.
    pub forward_response_headers: Vec<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            default_ows_url: Some("http://localhost:8085/geoserver/ows".to_string()),
            namespace_bound_url: false,
            namespaces: Vec::new(),
            credentials_header: "x-geoserver-credentials".to_string(),
            forward_response_headers: default_forward_response_headers(),
        }
    }
}

fn default_forward_response_headers() -> Vec<String> {
    [
        "Content-Type",
        "Content-Disposition",
        "Content-Language",
        "geowebcache-cache-result",
        "geowebcache-crs",
        "geowebcache-gridset",
        "geowebcache-tile-bounds",
        "geowebcache-tile-index",
        "geowebcache-miss-reason",
    ]
    .iter()
    .map(|h| h.to_string())
    .collect()
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Backend connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Backend call timeout (until response headers arrive) in seconds.
    pub upstream_secs: u64,

    /// Whole-call timeout enforced by the HTTP layer in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            upstream_secs: 30,
            request_secs: 60,
        }
    }
}

/// Rule storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
#[serde(default)]
pub struct RulesConfig {
    /// JSON file the rules are persisted to; in-memory only when absent.
    pub persistence_path: Option<String>,
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AdminConfig {
    /// Mount the `/interceptorrules` API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` overrides it.
    pub log_level: String,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Actions run for one (service, direction, operation) when a MODIFY rule matches.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct HandlerConfig {
    pub service: ServiceType,
    pub direction: Direction,
    pub operation: OperationType,
    /// Applied in order.
    pub actions: Vec<ActionConfig>,
}

/// A single declarative rewrite.
///
/// Values may use `{endpoint}`, `{service}` and `{operation}` placeholders.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionConfig {
    SetParam { name: String, value: String },
    RemoveParam { name: String },
    SetHeader { name: String, value: String },
    RemoveHeader { name: String },
    ReplaceText { from: String, to: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: InterceptorConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.upstream.credentials_header, "x-geoserver-credentials");
        assert_eq!(config.upstream.forward_response_headers.len(), 9);
        assert!(config.handlers.is_empty());
    }

    #[test]
    fn test_handlers_section() {
        let raw = r#"
            [upstream]
            default_ows_url = "http://geoserver:8080/geoserver/ows"

            [[handlers]]
            service = "WMS"
            direction = "REQUEST"
            operation = "GetMap"
            actions = [
                { action = "set_param", name = "CQL_FILTER", value = "owner='{endpoint}'" },
                { action = "remove_header", name = "cookie" },
            ]
        "#;
        let config: InterceptorConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.handlers.len(), 1);
        assert_eq!(config.handlers[0].operation, OperationType::GetMap);
        assert_eq!(
            config.handlers[0].actions[1],
            ActionConfig::RemoveHeader { name: "cookie".into() }
        );
    }
}
