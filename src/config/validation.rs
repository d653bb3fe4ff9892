//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (windows > 0, timeouts > 0, addresses parse)
//! - Check routing patterns capture a resource type
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::{GatewayConfig, RouteConfig};
use crate::routing::matcher::PathPattern;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
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

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.admin.enabled && config.admin.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "admin.bind_address",
            format!("'{}' is not a socket address", config.admin.bind_address),
        ));
    }

    if config.rate_limit.window_secs == 0 {
        errors.push(ValidationError::new("rate_limit.window_secs", "must be greater than 0"));
    }
    if config.rate_limit.enabled && config.rate_limit.limit == 0 {
        errors.push(ValidationError::new("rate_limit.limit", "must be greater than 0"));
    }

    if config.store.op_timeout_ms == 0 {
        errors.push(ValidationError::new("store.op_timeout_ms", "must be greater than 0"));
    }

    if config.registry.instance_ttl_secs == 0 {
        errors.push(ValidationError::new("registry.instance_ttl_secs", "must be greater than 0"));
    }
    if config.registry.group_ttl_secs < config.registry.instance_ttl_secs {
        errors.push(ValidationError::new(
            "registry.group_ttl_secs",
            "must not be shorter than registry.instance_ttl_secs",
        ));
    }

    if config.health_check.timeout_secs == 0 {
        errors.push(ValidationError::new("health_check.timeout_secs", "must be greater than 0"));
    }
    if config.health_check.enabled && config.health_check.interval_secs == 0 {
        errors.push(ValidationError::new("health_check.interval_secs", "must be greater than 0"));
    }
    if config.health_check.unhealthy_threshold == 0 || config.health_check.healthy_threshold == 0 {
        errors.push(ValidationError::new("health_check", "thresholds must be at least 1"));
    }

    for pattern in &config.routing.patterns {
        if let Err(message) = PathPattern::parse(pattern) {
            errors.push(ValidationError::new("routing.patterns", message));
        }
    }
    validate_route("routing.default_route", &config.routing.default_route, &mut errors);
    for (resource_type, route) in &config.routing.routes {
        validate_route(&format!("routing.routes.{}", resource_type), route, &mut errors);
    }

    match url::Url::parse(&config.upstream.default_backend) {
        Ok(url) if url.scheme() == "http" && url.host_str().is_some() => {}
        _ => errors.push(ValidationError::new(
            "upstream.default_backend",
            format!("'{}' is not an http URL", config.upstream.default_backend),
        )),
    }
    if config.upstream.default_timeout_secs == 0 {
        errors.push(ValidationError::new("upstream.default_timeout_secs", "must be greater than 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_route(field: &str, route: &RouteConfig, errors: &mut Vec<ValidationError>) {
    if route.service_name.trim().is_empty() {
        errors.push(ValidationError::new(field, "service_name must not be empty"));
    }
    if route.timeout_secs == 0 {
        errors.push(ValidationError::new(field, "timeout_secs must be greater than 0"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&GatewayConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = GatewayConfig::default();
        config.rate_limit.window_secs = 0;
        config.upstream.default_backend = "not a url".into();
        config.routing.patterns.push("/tasks/static".into());

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"rate_limit.window_secs"));
        assert!(fields.contains(&"upstream.default_backend"));
        assert!(fields.contains(&"routing.patterns"));
    }

    #[test]
    fn test_group_ttl_must_cover_instance_ttl() {
        let mut config = GatewayConfig::default();
        config.registry.instance_ttl_secs = 120;
        config.registry.group_ttl_secs = 60;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "registry.group_ttl_secs");
    }
}
