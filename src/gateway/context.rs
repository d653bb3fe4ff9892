//! Per-request facts gathered by the coordinator.

use std::time::{Duration, Instant};

use axum::http::Method;

use crate::http::RequestId;

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: RequestId,
    pub method: Method,
    pub resource_type: Option<String>,
    /// `host:port` of the dispatched instance.
    pub instance: Option<String>,
    /// Upstream timeout in force once a target is chosen.
    pub timeout: Duration,
    pub started: Instant,
}

impl RequestContext {
    pub fn new(
        request_id: RequestId,
        method: Method,
        timeout: Duration,
        started: Instant,
    ) -> Self {
        Self {
            request_id,
            method,
            resource_type: None,
            instance: None,
            timeout,
            started,
        }
    }

    /// Label used for the upstream metric.
    pub fn upstream_label(&self) -> &str {
        self.instance.as_deref().unwrap_or("default")
    }
}
