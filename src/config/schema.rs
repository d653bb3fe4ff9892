//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Data-plane listener (traffic that goes through the coordinator).
    pub listener: ListenerConfig,

    /// Control-plane listener (registry endpoints).
    pub admin: AdminConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Shared key-value store settings.
    pub store: StoreConfig,

    /// Service registry settings.
    pub registry: RegistryConfig,

    /// Health check settings.
    pub health_check: HealthCheckConfig,

    /// Resource-type routing table.
    pub routing: RoutingConfig,

    /// Default static backend.
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

    /// Maximum request body accepted by the gateway, in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Control-plane configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the registry endpoints.
    pub enabled: bool,

    /// Control-plane bind address.
    pub bind_address: String,

    /// Bearer token required on every control-plane request when set.
    pub api_key: Option<String>,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1:8081".to_string(),
            api_key: None,
        }
    }
}

/// Which counter backs the rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitStrategy {
    /// Process-local TTL cache. Fast, approximate across gateway replicas.
    Local,
    /// Shared store counter. Consistent across replicas, one round trip per request.
    Distributed,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Counter strategy. When unset: distributed on the redis backend,
    /// local otherwise.
    pub strategy: Option<RateLimitStrategy>,

    /// Requests allowed per window.
    pub limit: u64,

    /// Extra requests tolerated above `limit` before rejecting.
    pub burst: u64,

    /// Window length in seconds.
    pub window_secs: u64,

    /// Peers allowed to assert the caller through `X-User-ID`, such as an
    /// authenticating proxy in front of the gateway. From any other peer the
    /// header is dropped and the caller is keyed by address.
    pub trusted_proxies: Vec<IpAddr>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: None,
            limit: 100,
            burst: 20,
            window_secs: 60,
            trusted_proxies: Vec::new(),
        }
    }
}

impl RateLimitConfig {
    /// The strategy in force for a given store backend.
    pub fn effective_strategy(&self, backend: StoreBackend) -> RateLimitStrategy {
        self.strategy.unwrap_or(match backend {
            StoreBackend::Redis => RateLimitStrategy::Distributed,
            StoreBackend::Memory => RateLimitStrategy::Local,
        })
    }
}

/// Store backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// In-process store. Single gateway instance only.
    Memory,
    /// Redis shared by all gateway instances.
    Redis,
}

/// Shared key-value store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    /// Connection URL (Redis only).
    pub url: String,

    /// Per-operation timeout in milliseconds.
    pub op_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            url: "redis://127.0.0.1:6379".to_string(),
            op_timeout_ms: 1500,
        }
    }
}

/// Instance selection algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// `unix_seconds % len`. Stateless, weakly fair.
    TimeSlice,
    /// Rotating cursor per gateway process.
    RoundRobin,
}

/// Service registry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// TTL of an instance record in seconds.
    pub instance_ttl_secs: u64,

    /// TTL of a service group (and the service index) in seconds.
    pub group_ttl_secs: u64,

    /// Selection algorithm used by `ServiceRegistry::select`.
    pub selection: SelectionStrategy,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            instance_ttl_secs: 60,
            group_ttl_secs: 300,
            selection: SelectionStrategy::TimeSlice,
        }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable the background health monitor.
    pub enabled: bool,

    /// Health check interval in seconds.
    pub interval_secs: u64,

    /// Health check timeout in seconds.
    pub timeout_secs: u64,

    /// Number of consecutive failures before marking unhealthy.
    pub unhealthy_threshold: u32,

    /// Number of consecutive successes before marking healthy.
    pub healthy_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 10,
            timeout_secs: 2,
            unhealthy_threshold: 2,
            healthy_threshold: 1,
        }
    }
}

/// Routing policy for one resource type.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Logical service name looked up in the registry.
    pub service_name: String,

    /// Upstream timeout in seconds.
    #[serde(default = "default_route_timeout")]
    pub timeout_secs: u64,

    /// Retry budget handed to the host runtime.
    #[serde(default)]
    pub max_retries: u32,
}

fn default_route_timeout() -> u64 {
    60
}

/// Resource-type routing table.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Path patterns tried in order. `{type}` captures the resource type,
    /// a trailing `*` matches any remainder.
    pub patterns: Vec<String>,

    /// Resource type -> policy.
    pub routes: HashMap<String, RouteConfig>,

    /// Policy for resource types missing from `routes`.
    pub default_route: RouteConfig,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        let docking = RouteConfig {
            service_name: "docking-executor".to_string(),
            timeout_secs: 300,
            max_retries: 1,
        };

        let mut routes = HashMap::new();
        routes.insert("gnina-molecular-docking".to_string(), docking.clone());
        routes.insert("molecular-docking".to_string(), docking.clone());
        routes.insert("docking".to_string(), docking);
        routes.insert(
            "structure-prediction".to_string(),
            RouteConfig {
                service_name: "folding-executor".to_string(),
                timeout_secs: 600,
                max_retries: 0,
            },
        );
        routes.insert(
            "sequence-design".to_string(),
            RouteConfig {
                service_name: "design-executor".to_string(),
                timeout_secs: 300,
                max_retries: 1,
            },
        );

        Self {
            patterns: vec![
                "/api/v1/tasks/{type}/execute".to_string(),
                "/tasks/{type}/*".to_string(),
            ],
            routes,
            default_route: RouteConfig {
                service_name: "task-executor".to_string(),
                timeout_secs: default_route_timeout(),
                max_retries: 0,
            },
        }
    }
}

/// Default static backend used on fallback and for non-task paths.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the default backend (e.g., the core API).
    pub default_backend: String,

    /// Timeout for requests sent to the default backend, in seconds.
    pub default_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            default_backend: "http://127.0.0.1:8000".to_string(),
            default_timeout_secs: 30,
        }
    }
}

/// Timeout configuration for gateway-wide operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Hard ceiling on total request handling time, in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 900 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
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
