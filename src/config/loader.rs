//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<GatewayConfig, ConfigError> {
    let config: GatewayConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{RateLimitStrategy, SelectionStrategy, StoreBackend};

    #[test]
    fn test_parse_partial_config() {
        let config = parse_config(
            r#"
            [rate_limit]
            strategy = "distributed"
            limit = 10
            burst = 5
            trusted_proxies = ["10.0.0.2", "fd00::2"]

            [store]
            backend = "redis"
            url = "redis://cache:6379"

            [registry]
            selection = "round_robin"

            [routing.routes.molecular-docking]
            service_name = "gnina"
            timeout_secs = 120
            "#,
        )
        .unwrap();

        assert_eq!(config.rate_limit.strategy, Some(RateLimitStrategy::Distributed));
        assert_eq!(config.rate_limit.limit, 10);
        assert_eq!(config.rate_limit.window_secs, 60);
        assert_eq!(config.rate_limit.trusted_proxies.len(), 2);
        assert_eq!(config.rate_limit.trusted_proxies[0].to_string(), "10.0.0.2");
        assert_eq!(config.store.backend, StoreBackend::Redis);
        assert_eq!(config.registry.selection, SelectionStrategy::RoundRobin);
        let route = &config.routing.routes["molecular-docking"];
        assert_eq!(route.service_name, "gnina");
        assert_eq!(route.max_retries, 0);
    }

    #[test]
    fn test_rejects_invalid_values() {
        let err = parse_config("[rate_limit]\nwindow_secs = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("rate_limit.window_secs"));
    }

    #[test]
    fn test_strategy_follows_backend_when_unset() {
        let config = parse_config("[store]\nbackend = \"redis\"\n").unwrap();
        assert_eq!(config.rate_limit.strategy, None);
        assert_eq!(
            config.rate_limit.effective_strategy(config.store.backend),
            RateLimitStrategy::Distributed
        );

        let config = parse_config("").unwrap();
        assert_eq!(
            config.rate_limit.effective_strategy(config.store.backend),
            RateLimitStrategy::Local
        );
    }

    #[test]
    fn test_rejects_bad_trusted_proxy() {
        let err = parse_config("[rate_limit]\ntrusted_proxies = [\"gateway.local\"]\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(parse_config("").unwrap().rate_limit.trusted_proxies.is_empty());
    }

    #[test]
    fn test_rejects_unknown_strategy() {
        let err = parse_config("[rate_limit]\nstrategy = \"sliding\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
