//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Reject duplicate service/provider names
//! - Validate URLs and value ranges (intervals > 0, jitter in [0, 1))
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: SentinelConfig → Result<(), Vec<ValidationError>>

use std::collections::HashSet;
use thiserror::Error;
use url::Url;

use crate::config::schema::SentinelConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    Empty(String),

    #[error("duplicate {kind} '{name}'")]
    Duplicate { kind: &'static str, name: String },

    #[error("{field} has invalid URL '{value}': {reason}")]
    InvalidUrl {
        field: String,
        value: String,
        reason: String,
    },

    #[error("{0} must be greater than zero")]
    Zero(String),

    #[error("{field} out of range: {reason}")]
    OutOfRange { field: String, reason: String },
}

/// Parse `value` and require an http(s) scheme.
pub fn parse_http_url(field: &str, value: &str) -> Result<Url, ValidationError> {
    let url = Url::parse(value).map_err(|e| ValidationError::InvalidUrl {
        field: field.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ValidationError::InvalidUrl {
            field: field.to_string(),
            value: value.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &SentinelConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.monitor.interval_ms == 0 {
        errors.push(ValidationError::Zero("monitor.interval_ms".into()));
    }
    if config.monitor.channel_capacity == 0 {
        errors.push(ValidationError::Zero("monitor.channel_capacity".into()));
    }
    if config.probe.timeout_ms == 0 {
        errors.push(ValidationError::Zero("probe.timeout_ms".into()));
    }
    if config.probe.max_failures == 0 {
        errors.push(ValidationError::Zero("probe.max_failures".into()));
    }
    if !(0.0..1.0).contains(&config.probe.jitter) {
        errors.push(ValidationError::OutOfRange {
            field: "probe.jitter".into(),
            reason: format!("{} not in [0, 1)", config.probe.jitter),
        });
    }
    if config.fallback.max_failures == 0 {
        errors.push(ValidationError::Zero("fallback.max_failures".into()));
    }
    if config.fallback.attempt_timeout_ms == 0 {
        errors.push(ValidationError::Zero("fallback.attempt_timeout_ms".into()));
    }

    let mut seen = HashSet::new();
    for (i, service) in config.services.iter().enumerate() {
        if service.name.trim().is_empty() {
            errors.push(ValidationError::Empty(format!("services[{}].name", i)));
        } else if !seen.insert(service.name.as_str()) {
            errors.push(ValidationError::Duplicate {
                kind: "service",
                name: service.name.clone(),
            });
        }
        if let Err(e) = parse_http_url(&format!("services[{}].target", i), &service.target) {
            errors.push(e);
        }
    }

    let mut seen = HashSet::new();
    for (i, provider) in config.providers.iter().enumerate() {
        if provider.kind.trim().is_empty() {
            errors.push(ValidationError::Empty(format!("providers[{}].kind", i)));
        } else if !seen.insert(provider.kind.as_str()) {
            errors.push(ValidationError::Duplicate {
                kind: "provider",
                name: provider.kind.clone(),
            });
        }
        if let Err(e) = parse_http_url(&format!("providers[{}].endpoint", i), &provider.endpoint) {
            errors.push(e);
        }
        if let Some(stream) = &provider.stream_endpoint {
            if let Err(e) = parse_http_url(&format!("providers[{}].stream_endpoint", i), stream) {
                errors.push(e);
            }
        }
        if let Some(health) = &provider.health_endpoint {
            if let Err(e) = parse_http_url(&format!("providers[{}].health_endpoint", i), health) {
                errors.push(e);
            }
        }
    }

    if config.broadcast.enabled {
        match Url::parse(&config.broadcast.url) {
            Ok(url) if url.scheme() == "ws" => {}
            Ok(url) => errors.push(ValidationError::InvalidUrl {
                field: "broadcast.url".into(),
                value: config.broadcast.url.clone(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            }),
            Err(e) => errors.push(ValidationError::InvalidUrl {
                field: "broadcast.url".into(),
                value: config.broadcast.url.clone(),
                reason: e.to_string(),
            }),
        }
        if config.broadcast.channel.trim().is_empty() {
            errors.push(ValidationError::Empty("broadcast.channel".into()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{ProviderConfig, ServiceConfig};

    fn service(name: &str, target: &str) -> ServiceConfig {
        ServiceConfig {
            name: name.to_string(),
            target: target.to_string(),
            display_name: None,
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&SentinelConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = SentinelConfig::default();
        config.monitor.interval_ms = 0;
        config.probe.jitter = 1.5;
        config.services.push(service("llm-engine", "http://127.0.0.1:1/health"));
        config.services.push(service("llm-engine", "ftp://example.com"));
        config.providers.push(ProviderConfig {
            kind: String::new(),
            endpoint: "not a url".into(),
            stream_endpoint: None,
            health_endpoint: None,
        });

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 6, "{:?}", errors);
        assert!(errors.contains(&ValidationError::Duplicate {
            kind: "service",
            name: "llm-engine".into()
        }));
        assert!(errors.contains(&ValidationError::Zero("monitor.interval_ms".into())));
    }

    #[test]
    fn test_broadcast_requires_websocket_url() {
        let mut config = SentinelConfig::default();
        config.broadcast.enabled = true;
        config.broadcast.url = "http://relay.local/status".into();

        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(errors[0], ValidationError::InvalidUrl { .. }));
    }
}
