//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check upstream URLs and handler definitions
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: InterceptorConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

use crate::config::schema::InterceptorConfig;
use crate::dispatch::DispatchTable;

/// One semantic problem in a configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

fn check_url(field: &str, raw: &str, errors: &mut Vec<ValidationError>) {
    match Url::parse(raw) {
        Ok(url) if url.scheme() == "http" => {}
        Ok(url) => errors.push(ValidationError::new(
            field,
            format!("unsupported scheme '{}' (only http)", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new(field, format!("invalid URL '{raw}': {e}"))),
    }
}

pub fn validate_config(config: &InterceptorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::new("listener.max_body_bytes", "must be > 0"));
    }

    let upstream = &config.upstream;
    if let Some(url) = &upstream.default_ows_url {
        check_url("upstream.default_ows_url", url, &mut errors);
    }
    for (i, ns) in upstream.namespaces.iter().enumerate() {
        if ns.namespace.trim().is_empty() {
            errors.push(ValidationError::new(format!("upstream.namespaces[{i}].namespace"), "must not be empty"));
        }
        check_url(&format!("upstream.namespaces[{i}].url"), &ns.url, &mut errors);
    }
    let has_binding = upstream.namespace_bound_url && !upstream.namespaces.is_empty();
    if upstream.default_ows_url.is_none() && !has_binding {
        errors.push(ValidationError::new(
            "upstream",
            "either default_ows_url or namespace-bound URLs must be configured",
        ));
    }
    if axum::http::HeaderName::from_bytes(upstream.credentials_header.as_bytes()).is_err() {
        errors.push(ValidationError::new("upstream.credentials_header", "not a valid header name"));
    }
    for name in &upstream.forward_response_headers {
        if axum::http::HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(ValidationError::new(
                "upstream.forward_response_headers",
                format!("'{name}' is not a valid header name"),
            ));
        }
    }

    for (field, value) in [
        ("timeouts.connect_secs", config.timeouts.connect_secs),
        ("timeouts.upstream_secs", config.timeouts.upstream_secs),
        ("timeouts.request_secs", config.timeouts.request_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be > 0"));
        }
    }

    if config.admin.enabled && config.admin.api_key.trim().is_empty() {
        errors.push(ValidationError::new("admin.api_key", "must not be empty when admin is enabled"));
    }

    if !["trace", "debug", "info", "warn", "error"].contains(&config.observability.log_level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", config.observability.log_level),
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if let Err(e) = DispatchTable::from_config(&config.handlers) {
        errors.push(ValidationError::new("handlers", e.to_string()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
