//! Control-plane handlers for the service registry.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::health::{HealthMonitor, HealthReport};
use crate::http::response::json_error;
use crate::registry::{
    InstanceKey, RegistrationRequest, RegistryError, ServiceInfo, ServiceInstance, ServiceRegistry,
};

#[derive(Clone)]
pub struct AdminState {
    pub registry: Arc<ServiceRegistry>,
    pub monitor: Arc<HealthMonitor>,
}

#[derive(Debug, Deserialize)]
pub struct ServiceQuery {
    pub name: Option<String>,
    /// Only return healthy instances.
    #[serde(default)]
    pub healthy: bool,
}

#[derive(Debug, Deserialize)]
pub struct InstanceQuery {
    pub name: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Serialize)]
pub struct InstanceReport {
    pub instance: String,
    #[serde(flatten)]
    pub report: HealthReport,
}

fn bad_request(message: impl Into<String>) -> Response {
    json_error(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn registry_failure(e: RegistryError) -> Response {
    match e {
        RegistryError::InvalidService(e) => bad_request(e.to_string()),
        RegistryError::NoServicesAvailable => {
            json_error(StatusCode::NOT_FOUND, "not_found", "no services available")
        }
        RegistryError::Backend(e) => {
            tracing::error!(error = %e, "Registry backend failure");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "registry_unavailable",
                "registry backend unavailable",
            )
        }
    }
}

fn required(field: &str, value: Option<String>) -> Result<String, Response> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| bad_request(format!("missing required parameter '{}'", field)))
}

/// `POST /registry/services`
pub async fn register_service(
    State(state): State<AdminState>,
    payload: Result<Json<RegistrationRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(body) => body,
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    let info = match ServiceInfo::try_from(request) {
        Ok(info) => info,
        Err(e) => return bad_request(e.to_string()),
    };

    match state.registry.register(info).await {
        Ok(instance) => (
            StatusCode::CREATED,
            Json(json!({
                "registered": instance.key().to_string(),
                "service": instance,
            })),
        )
            .into_response(),
        Err(e) => registry_failure(e),
    }
}

/// `GET /registry/services?name=`
pub async fn discover_services(
    State(state): State<AdminState>,
    query: Result<Query<ServiceQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    let name = match required("name", query.name) {
        Ok(name) => name,
        Err(response) => return response,
    };

    let result = if query.healthy {
        state.registry.get_healthy(&name).await
    } else {
        state.registry.discover(&name).await
    };

    match result {
        Ok(services) => Json(json!({ "name": name, "services": services })).into_response(),
        Err(e) => registry_failure(e),
    }
}

/// `DELETE /registry/services?name=&host=&port=`
pub async fn deregister_service(
    State(state): State<AdminState>,
    query: Result<Query<InstanceQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    let (name, host) = match (required("name", query.name), required("host", query.host)) {
        (Ok(name), Ok(host)) => (name, host),
        (Err(response), _) | (_, Err(response)) => return response,
    };
    let Some(port) = query.port else {
        return bad_request("missing required parameter 'port'");
    };

    let key = InstanceKey::new(&name, &host, port).to_string();
    match state.registry.deregister(&name, &host, port).await {
        Ok(true) => Json(json!({ "deregistered": key })).into_response(),
        Ok(false) => json_error(StatusCode::NOT_FOUND, "not_found", format!("{} is not registered", key)),
        Err(e) => registry_failure(e),
    }
}

/// `POST /registry/services/check?name=`
pub async fn check_service(
    State(state): State<AdminState>,
    query: Result<Query<ServiceQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    let name = match required("name", query.name) {
        Ok(name) => name,
        Err(response) => return response,
    };

    match state.monitor.check_service(&name).await {
        Ok(results) => {
            let reports: Vec<InstanceReport> = results
                .into_iter()
                .map(|(instance, report): (ServiceInstance, HealthReport)| InstanceReport {
                    instance: instance.address(),
                    report,
                })
                .collect();
            Json(json!({ "name": name, "reports": reports })).into_response()
        }
        Err(e) => registry_failure(e),
    }
}
