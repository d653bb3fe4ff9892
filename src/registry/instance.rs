//! Service instance records.
//!
//! # Responsibilities
//! - Validate registration input at the boundary
//! - Represent a registered instance and its health status
//! - Map instances to and from store hash fields
//!
//! # Design Decisions
//! - Instances are keyed by (name, host, port); re-registration overwrites
//! - Metadata is a JSON object stored as one serialized field
//! - Names never contain `:`, so `service:{name}:{host}:{port}` keys are
//!   unambiguous; the only hosts with `:` are IPv6 literals

use std::collections::HashMap;
use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Health check path used when a registration does not provide one.
pub const DEFAULT_HEALTH_CHECK_PATH: &str = "/health";

/// Service name that would collide with the service index key.
const RESERVED_NAME: &str = "index";

/// Health status stored on every instance record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

impl From<bool> for HealthStatus {
    fn from(healthy: bool) -> Self {
        if healthy {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        }
    }
}

impl FromStr for HealthStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "healthy" => Ok(HealthStatus::Healthy),
            "unhealthy" => Ok(HealthStatus::Unhealthy),
            other => Err(format!("unknown status '{}'", other)),
        }
    }
}

/// Unique identity of an instance: `(name, host, port)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceKey {
    pub name: String,
    pub host: String,
    pub port: u16,
}

impl InstanceKey {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "service:{}:{}:{}", self.name, self.host, self.port)
    }
}

/// Registration payload as received on the wire. Nothing is trusted yet.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RegistrationRequest {
    pub name: Option<String>,
    pub host: Option<String>,
    pub port: Option<i64>,
    pub health_check: Option<String>,
    pub metadata: Option<Value>,
}

/// Why a registration was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidService {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("field '{field}' contains invalid characters: '{value}'")]
    InvalidCharacters { field: &'static str, value: String },
    #[error("service name '{0}' is reserved")]
    ReservedName(String),
    #[error("port {0} is outside 1-65535")]
    InvalidPort(i64),
    #[error("health check path must start with '/': '{0}'")]
    InvalidHealthCheckPath(String),
    #[error("metadata must be a JSON object")]
    InvalidMetadata,
}

/// A validated registration.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceInfo {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub health_check: String,
    pub metadata: Map<String, Value>,
}

impl ServiceInfo {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            health_check: DEFAULT_HEALTH_CHECK_PATH.to_string(),
            metadata: Map::new(),
        }
    }

    pub fn with_health_check(mut self, path: impl Into<String>) -> Self {
        self.health_check = path.into();
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn key(&self) -> InstanceKey {
        InstanceKey::new(&self.name, &self.host, self.port)
    }

    /// Check the invariants a constructed value must hold.
    pub fn validate(&self) -> Result<(), InvalidService> {
        check_token("name", &self.name)?;
        if self.name.contains(':') {
            return Err(InvalidService::InvalidCharacters {
                field: "name",
                value: self.name.clone(),
            });
        }
        if self.name == RESERVED_NAME {
            return Err(InvalidService::ReservedName(self.name.clone()));
        }
        check_token("host", &self.host)?;
        if self.host.contains(':') && self.host.parse::<Ipv6Addr>().is_err() {
            return Err(InvalidService::InvalidCharacters {
                field: "host",
                value: self.host.clone(),
            });
        }
        if self.port == 0 {
            return Err(InvalidService::InvalidPort(0));
        }
        if !self.health_check.starts_with('/') {
            return Err(InvalidService::InvalidHealthCheckPath(self.health_check.clone()));
        }
        Ok(())
    }
}

fn check_token(field: &'static str, value: &str) -> Result<(), InvalidService> {
    if value.is_empty() {
        return Err(InvalidService::MissingField(field));
    }
    if value.chars().any(|c| c.is_whitespace() || c == '/' || c.is_control()) {
        return Err(InvalidService::InvalidCharacters {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

impl TryFrom<RegistrationRequest> for ServiceInfo {
    type Error = InvalidService;

    fn try_from(request: RegistrationRequest) -> Result<Self, Self::Error> {
        let name = request
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or(InvalidService::MissingField("name"))?;
        let host = request
            .host
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .ok_or(InvalidService::MissingField("host"))?;
        let port = request.port.ok_or(InvalidService::MissingField("port"))?;
        let port = u16::try_from(port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or(InvalidService::InvalidPort(port))?;

        let metadata = match request.metadata {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => return Err(InvalidService::InvalidMetadata),
        };

        let info = ServiceInfo {
            name,
            host,
            port,
            health_check: request
                .health_check
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| DEFAULT_HEALTH_CHECK_PATH.to_string()),
            metadata,
        };
        info.validate()?;
        Ok(info)
    }
}

/// A registered instance as stored in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub health_check: String,
    pub status: HealthStatus,
    /// Unix seconds of the last registration or successful probe.
    pub last_seen: u64,
    pub registered_at: u64,
    pub metadata: Map<String, Value>,
    pub ttl_secs: u64,
}

impl ServiceInstance {
    /// A freshly registered, healthy instance.
    pub fn from_info(info: ServiceInfo, now: u64, ttl_secs: u64) -> Self {
        Self {
            name: info.name,
            host: info.host,
            port: info.port,
            health_check: info.health_check,
            status: HealthStatus::Healthy,
            last_seen: now,
            registered_at: now,
            metadata: info.metadata,
            ttl_secs,
        }
    }

    pub fn key(&self) -> InstanceKey {
        InstanceKey::new(&self.name, &self.host, self.port)
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }

    /// `host:port`, as used in the selected-instance header. IPv6 hosts are
    /// bracketed so the result is a valid URI authority.
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Base URL requests are forwarded to.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.address())
    }

    pub fn health_url(&self) -> String {
        format!("{}{}", self.base_url(), self.health_check)
    }

    /// Flatten into store hash fields.
    pub fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            ("name".into(), self.name.clone()),
            ("host".into(), self.host.clone()),
            ("port".into(), self.port.to_string()),
            ("health_check".into(), self.health_check.clone()),
            ("status".into(), self.status.as_str().into()),
            ("last_seen".into(), self.last_seen.to_string()),
            ("registered_at".into(), self.registered_at.to_string()),
            ("metadata".into(), Value::Object(self.metadata.clone()).to_string()),
            ("ttl".into(), self.ttl_secs.to_string()),
        ]
    }

    /// Rebuild from store hash fields.
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self, String> {
        let field = |name: &str| {
            fields
                .get(name)
                .map(String::as_str)
                .ok_or_else(|| format!("missing field '{}'", name))
        };
        let number = |name: &str| -> Result<u64, String> {
            field(name)?
                .parse()
                .map_err(|e| format!("field '{}': {}", name, e))
        };

        let metadata = match fields.get("metadata").map(|m| serde_json::from_str(m)) {
            None => Map::new(),
            Some(Ok(Value::Object(map))) => map,
            Some(Ok(_)) => return Err("metadata is not an object".into()),
            Some(Err(e)) => return Err(format!("metadata: {}", e)),
        };

        Ok(Self {
            name: field("name")?.to_string(),
            host: field("host")?.to_string(),
            port: field("port")?
                .parse()
                .map_err(|e| format!("field 'port': {}", e))?,
            health_check: fields
                .get("health_check")
                .cloned()
                .unwrap_or_else(|| DEFAULT_HEALTH_CHECK_PATH.to_string()),
            status: field("status")?.parse()?,
            last_seen: number("last_seen")?,
            registered_at: number("registered_at").unwrap_or(0),
            metadata,
            ttl_secs: number("ttl").unwrap_or(0),
        })
    }
}
