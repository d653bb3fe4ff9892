//! Single-instance health probe.
//!
//! # Responsibilities
//! - GET `http://host:port{health_check}` with a bounded timeout
//! - Classify the outcome: 2xx is healthy, anything else is not
//!
//! # Design Decisions
//! - One pooled client shared by every probe
//! - Probes never return errors; failures become unhealthy reports

use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{header, Request};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde::Serialize;
use tokio::time;

use crate::registry::ServiceInstance;

const USER_AGENT: &str = "task-gateway-health-check";

/// Outcome of one probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub detail: String,
    pub latency_ms: u64,
}

/// Issues health probes against registered instances.
#[derive(Clone)]
pub struct HealthChecker {
    client: Client<HttpConnector, Body>,
    timeout: Duration,
}

impl HealthChecker {
    pub fn new(timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(timeout));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self { client, timeout }
    }

    /// Probe one instance.
    pub async fn check(&self, instance: &ServiceInstance) -> HealthReport {
        let started = Instant::now();
        let url = instance.health_url();

        let request = match Request::builder()
            .method("GET")
            .uri(&url)
            .header(header::USER_AGENT, USER_AGENT)
            .body(Body::empty())
        {
            Ok(req) => req,
            Err(e) => {
                return HealthReport {
                    healthy: false,
                    detail: format!("invalid health check url {}: {}", url, e),
                    latency_ms: 0,
                }
            }
        };

        let (healthy, detail) = match time::timeout(self.timeout, self.client.request(request)).await {
            Ok(Ok(response)) if response.status().is_success() => {
                (true, format!("status {}", response.status().as_u16()))
            }
            Ok(Ok(response)) => (false, format!("status {}", response.status().as_u16())),
            Ok(Err(e)) => (false, format!("connection error: {}", e)),
            Err(_) => (false, format!("timed out after {}ms", self.timeout.as_millis())),
        };

        if !healthy {
            tracing::debug!(instance = %instance.key(), url = %url, detail = %detail, "Health probe failed");
        }

        HealthReport {
            healthy,
            detail,
            latency_ms: started.elapsed().as_millis() as u64,
        }
    }
}

impl std::fmt::Debug for HealthChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthChecker")
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ServiceInfo;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_once(status_line: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!("{}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n", status_line);
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        port
    }

    fn instance(port: u16) -> ServiceInstance {
        ServiceInstance::from_info(ServiceInfo::new("svc", "127.0.0.1", port), 0, 60)
    }

    #[tokio::test]
    async fn test_success_status_is_healthy() {
        let port = serve_once("HTTP/1.1 200 OK").await;
        let report = HealthChecker::new(Duration::from_secs(2)).check(&instance(port)).await;
        assert!(report.healthy, "{:?}", report);
    }

    #[tokio::test]
    async fn test_error_status_is_unhealthy() {
        let port = serve_once("HTTP/1.1 503 Service Unavailable").await;
        let report = HealthChecker::new(Duration::from_secs(2)).check(&instance(port)).await;
        assert!(!report.healthy);
        assert_eq!(report.detail, "status 503");
    }

    #[tokio::test]
    async fn test_connection_refused_is_unhealthy() {
        // Bind and drop to get a port nobody listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let report = HealthChecker::new(Duration::from_secs(2)).check(&instance(port)).await;
        assert!(!report.healthy);
        assert!(report.detail.starts_with("connection error"), "{}", report.detail);
    }
}
