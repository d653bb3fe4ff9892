//! Resource-type routing.
//!
//! # Responsibilities
//! - Extract the task type from the request path
//! - Resolve the static route policy for that type
//! - Pick a healthy instance of the policy's service, or fall back
//! - Validate method and content type of task requests
//!
//! # State Machine
//! ```text
//! RECEIVED → TYPE_EXTRACTED → DISPATCH
//!     │             └───────→ FALLBACK (no healthy instance, registry error)
//!     └─────────────────────→ NO_OVERRIDE (not a task path)
//! ```
//!
//! # Design Decisions
//! - Route table immutable after construction (thread-safe without locks)
//! - Patterns tried in configuration order, first match wins
//! - No retries here; `max_retries` is handed to the caller
//! - Registry failures degrade to fallback, never to an error response

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderName, HeaderValue, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::config::{RouteConfig, RoutingConfig};
use crate::http::response::json_error;
use crate::observability::metrics;
use crate::registry::{ServiceInstance, ServiceRegistry};
use crate::routing::matcher::PathPattern;

pub const X_TASK_TYPE: HeaderName = HeaderName::from_static("x-task-type");
pub const X_SELECTED_INSTANCE: HeaderName = HeaderName::from_static("x-selected-instance");
pub const X_UPSTREAM_TIMEOUT: HeaderName = HeaderName::from_static("x-upstream-timeout");

/// Methods accepted on task routes.
const ALLOWED_METHODS: [Method; 4] = [Method::GET, Method::POST, Method::PUT, Method::DELETE];

/// Outcome of routing one request.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteDecision {
    /// Not a task path; the default route applies.
    NoOverride,
    /// Task path without a usable instance; the default route applies.
    Fallback { resource_type: String, reason: String },
    /// Send to `instance`.
    Dispatch {
        resource_type: String,
        instance: ServiceInstance,
        timeout: Duration,
        max_retries: u32,
    },
}

impl RouteDecision {
    pub fn outcome(&self) -> &'static str {
        match self {
            RouteDecision::NoOverride => "no_override",
            RouteDecision::Fallback { .. } => "fallback",
            RouteDecision::Dispatch { .. } => "dispatch",
        }
    }
}

/// Why a task request was refused before routing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("method {0} is not allowed on task routes")]
    MethodNotAllowed(Method),
    #[error("{method} requests must carry Content-Type: application/json")]
    UnsupportedMediaType { method: Method, content_type: Option<String> },
}

impl ValidationError {
    pub fn status(&self) -> StatusCode {
        match self {
            ValidationError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ValidationError::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        }
    }
}

impl IntoResponse for ValidationError {
    fn into_response(self) -> Response {
        match &self {
            ValidationError::MethodNotAllowed(_) => {
                let mut response = json_error(self.status(), "method_not_allowed", self.to_string());
                response
                    .headers_mut()
                    .insert(header::ALLOW, HeaderValue::from_static("GET, POST, PUT, DELETE"));
                response
            }
            ValidationError::UnsupportedMediaType { .. } => {
                json_error(self.status(), "unsupported_media_type", self.to_string())
            }
        }
    }
}

pub struct RequestRouter {
    patterns: Vec<PathPattern>,
    routes: HashMap<String, RouteConfig>,
    default_route: RouteConfig,
    registry: Arc<ServiceRegistry>,
}

impl RequestRouter {
    /// Compile the routing table. Fails on an invalid pattern.
    pub fn new(config: &RoutingConfig, registry: Arc<ServiceRegistry>) -> Result<Self, String> {
        let patterns = config
            .patterns
            .iter()
            .map(|p| PathPattern::parse(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            patterns,
            routes: config.routes.clone(),
            default_route: config.default_route.clone(),
            registry,
        })
    }

    /// Task type from the first matching pattern.
    pub fn extract_resource_type(&self, path: &str) -> Option<String> {
        self.patterns.iter().find_map(|p| p.captures(path))
    }

    /// Route policy for a task type; unknown types get the default policy.
    pub fn resolve_config(&self, resource_type: &str) -> &RouteConfig {
        self.routes.get(resource_type).unwrap_or(&self.default_route)
    }

    /// Decide where a request goes and annotate it for dispatch.
    pub async fn route<B>(&self, request: &mut Request<B>) -> RouteDecision {
        let decision = self.decide(request).await;
        metrics::record_route_decision(decision.outcome());
        decision
    }

    async fn decide<B>(&self, request: &mut Request<B>) -> RouteDecision {
        let Some(resource_type) = self.extract_resource_type(request.uri().path()) else {
            return RouteDecision::NoOverride;
        };
        let route = self.resolve_config(&resource_type);

        let healthy = match self.registry.get_healthy(&route.service_name).await {
            Ok(instances) => instances,
            Err(e) => {
                return fallback(resource_type, &route.service_name, format!("registry error: {}", e));
            }
        };

        let instance = match self.registry.select(&healthy) {
            Ok(instance) => instance,
            Err(_) => {
                return fallback(resource_type, &route.service_name, "no healthy instances".into());
            }
        };

        let timeout = Duration::from_secs(route.timeout_secs);
        if let Err(reason) = annotate(request.headers_mut(), &resource_type, &instance, timeout) {
            return fallback(resource_type, &route.service_name, reason);
        }

        tracing::debug!(
            resource_type = %resource_type,
            service = %route.service_name,
            instance = %instance.address(),
            "Routing to instance"
        );

        RouteDecision::Dispatch {
            resource_type,
            instance,
            timeout,
            max_retries: route.max_retries,
        }
    }

    /// Check method and content type. Only task paths are constrained.
    pub fn validate<B>(&self, request: &Request<B>) -> Result<(), ValidationError> {
        if self.extract_resource_type(request.uri().path()).is_none() {
            return Ok(());
        }

        let method = request.method();
        if !ALLOWED_METHODS.contains(method) {
            return Err(ValidationError::MethodNotAllowed(method.clone()));
        }

        if *method == Method::POST || *method == Method::PUT {
            let content_type = request
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            if !content_type.is_some_and(is_json) {
                return Err(ValidationError::UnsupportedMediaType {
                    method: method.clone(),
                    content_type: content_type.map(str::to_string),
                });
            }
        }
        Ok(())
    }
}

fn fallback(resource_type: String, service: &str, reason: String) -> RouteDecision {
    tracing::warn!(
        resource_type = %resource_type,
        service = %service,
        reason = %reason,
        "Falling back to default route"
    );
    RouteDecision::Fallback {
        resource_type,
        reason,
    }
}

fn annotate(
    headers: &mut axum::http::HeaderMap,
    resource_type: &str,
    instance: &ServiceInstance,
    timeout: Duration,
) -> Result<(), String> {
    let encode = |value: &str| {
        HeaderValue::from_str(value).map_err(|_| format!("cannot encode header value '{}'", value))
    };
    let task_type = encode(resource_type)?;
    let selected = encode(&instance.address())?;

    headers.insert(X_TASK_TYPE, task_type);
    headers.insert(X_SELECTED_INSTANCE, selected);
    headers.insert(X_UPSTREAM_TIMEOUT, HeaderValue::from(timeout.as_secs()));
    Ok(())
}

/// `application/json`, parameters allowed, case-insensitive.
fn is_json(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|essence| essence.trim().eq_ignore_ascii_case("application/json"))
        .unwrap_or(false)
}
