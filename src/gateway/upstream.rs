//! Forwarding to upstream services.
//!
//! # Responsibilities
//! - Rewrite the request URI to the chosen target
//! - Bound the exchange by the target timeout
//! - Map failures to gateway responses (timeout 504, connect error 502)
//!
//! # Design Decisions
//! - Bodies stream through; nothing is buffered
//! - Hop-by-hop headers are stripped both ways
//! - The original Host header is preserved

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::uri::{Authority, Scheme};
use axum::http::{Request, Uri};
use axum::response::Response;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::time;
use url::Url;

use crate::http::response::{bad_gateway, gateway_timeout, strip_hop_by_hop};
use crate::registry::ServiceInstance;

/// Where and how long to forward.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamTarget {
    pub scheme: Scheme,
    pub authority: Authority,
    pub timeout: Duration,
}

impl UpstreamTarget {
    pub fn from_instance(instance: &ServiceInstance, timeout: Duration) -> Result<Self, String> {
        let authority = Authority::try_from(instance.address().as_str())
            .map_err(|e| format!("invalid instance address {}: {}", instance.address(), e))?;
        Ok(Self {
            scheme: Scheme::HTTP,
            authority,
            timeout,
        })
    }

    /// Parse a base URL such as `http://core-api:8000`. Only the origin is used.
    pub fn from_url(base: &str, timeout: Duration) -> Result<Self, String> {
        let url = Url::parse(base).map_err(|e| format!("invalid upstream url '{}': {}", base, e))?;
        if url.scheme() != "http" {
            return Err(format!("unsupported upstream scheme '{}'", url.scheme()));
        }
        let host = url
            .host_str()
            .ok_or_else(|| format!("upstream url '{}' has no host", base))?;
        let origin = match url.port_or_known_default() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        let authority = Authority::try_from(origin.as_str())
            .map_err(|e| format!("invalid upstream authority '{}': {}", origin, e))?;

        Ok(Self {
            scheme: Scheme::HTTP,
            authority,
            timeout,
        })
    }

    fn rewrite(&self, uri: &Uri) -> Result<Uri, String> {
        let path_and_query = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
            .map_err(|e| e.to_string())
    }
}

#[async_trait]
pub trait Upstream: Send + Sync {
    async fn forward(&self, request: Request<Body>, target: &UpstreamTarget) -> Response;
}

/// Forwards over a pooled HTTP/1.1 client.
#[derive(Clone)]
pub struct HttpUpstream {
    client: Client<HttpConnector, Body>,
}

impl HttpUpstream {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { client }
    }
}

impl Default for HttpUpstream {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn forward(&self, request: Request<Body>, target: &UpstreamTarget) -> Response {
        let (mut parts, body) = request.into_parts();
        parts.uri = match target.rewrite(&parts.uri) {
            Ok(uri) => uri,
            Err(e) => {
                tracing::error!(authority = %target.authority, error = %e, "Failed to rewrite upstream uri");
                return bad_gateway("invalid upstream target");
            }
        };
        strip_hop_by_hop(&mut parts.headers);
        let request = Request::from_parts(parts, body);

        match time::timeout(target.timeout, self.client.request(request)).await {
            Ok(Ok(response)) => {
                let (mut parts, body) = response.into_parts();
                strip_hop_by_hop(&mut parts.headers);
                Response::from_parts(parts, Body::new(body))
            }
            Ok(Err(e)) => {
                tracing::error!(authority = %target.authority, error = %e, "Upstream error");
                bad_gateway(format!("upstream {} unavailable", target.authority))
            }
            Err(_) => {
                tracing::warn!(
                    authority = %target.authority,
                    timeout_secs = target.timeout.as_secs(),
                    "Upstream timed out"
                );
                gateway_timeout(format!("upstream {} did not respond in time", target.authority))
            }
        }
    }
}
