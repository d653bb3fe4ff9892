//! Gateway request coordinator.
//!
//! # Responsibilities
//! - Run the pipeline stages in a fixed order
//! - Short-circuit on rate limit, auth and validation rejections
//! - Choose the upstream target from the route decision
//! - Stamp correlation and rate-limit headers on every response
//!
//! # Design Decisions
//! - Even a 429 carries `X-Request-ID`; the id is resolved at the short-circuit
//! - `X-User-ID` from an untrusted peer is stripped before anything reads it
//! - Every stage after rate limiting runs inside a span carrying `request_id`
//! - A dispatch target that cannot be built falls back to the default route

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use tracing::Instrument;

use crate::gateway::{Authenticator, RequestContext, Upstream, UpstreamTarget};
use crate::http::RequestTracer;
use crate::observability::metrics;
use crate::routing::{RequestRouter, RouteDecision};
use crate::security::{CallerIdentity, RateDecision, RateLimiter};

pub struct Coordinator {
    limiter: RateLimiter,
    tracer: RequestTracer,
    authenticator: Arc<dyn Authenticator>,
    router: RequestRouter,
    upstream: Arc<dyn Upstream>,
    default_target: UpstreamTarget,
}

impl Coordinator {
    pub fn new(
        limiter: RateLimiter,
        authenticator: Arc<dyn Authenticator>,
        router: RequestRouter,
        upstream: Arc<dyn Upstream>,
        default_target: UpstreamTarget,
    ) -> Self {
        Self {
            limiter,
            tracer: RequestTracer::new(),
            authenticator,
            router,
            upstream,
            default_target,
        }
    }

    /// Handle one data-plane request end to end.
    pub async fn handle(&self, mut request: Request<Body>) -> Response {
        let started = Instant::now();
        let identity = CallerIdentity::from_request(&mut request, self.limiter.trusted_proxies());
        let method = request.method().clone();

        let rate = if self.limiter.is_enabled() {
            Some(self.limiter.check(&identity).await)
        } else {
            None
        };

        if let Some(decision) = rate.as_ref().filter(|d| !d.allowed) {
            let request_id = self.tracer.get_or_create(request.headers());
            tracing::info!(
                request_id = %request_id,
                identifier = %identity,
                stage = "rate_limit",
                outcome = "rejected",
                current = decision.current,
                "Request rejected"
            );
            let mut response = decision.rejection();
            self.tracer.propagate(&request_id, response.headers_mut());
            metrics::record_request(&method, response.status().as_u16(), "none", started);
            return response;
        }

        let request_id = self.tracer.get_or_create(request.headers());
        let span = tracing::info_span!(
            "request",
            request_id = %request_id,
            identifier = %identity,
            method = %method,
            path = %request.uri().path(),
        );

        let mut ctx = RequestContext::new(request_id, method, self.default_target.timeout, started);

        let mut response = self
            .process(request, &mut ctx, rate.as_ref())
            .instrument(span)
            .await;

        if let Some(decision) = &rate {
            decision.apply_headers(response.headers_mut());
        }
        self.tracer.propagate(&ctx.request_id, response.headers_mut());
        metrics::record_request(
            &ctx.method,
            response.status().as_u16(),
            ctx.upstream_label(),
            ctx.started,
        );
        response
    }

    async fn process(
        &self,
        mut request: Request<Body>,
        ctx: &mut RequestContext,
        rate: Option<&RateDecision>,
    ) -> Response {
        match rate {
            Some(d) if d.fail_open => {
                tracing::debug!(stage = "rate_limit", outcome = "fail_open", "Stage complete")
            }
            Some(d) => tracing::debug!(
                stage = "rate_limit",
                outcome = "allowed",
                current = d.current,
                remaining = d.remaining(),
                "Stage complete"
            ),
            None => tracing::debug!(stage = "rate_limit", outcome = "disabled", "Stage complete"),
        }

        self.tracer.propagate(&ctx.request_id, request.headers_mut());
        tracing::debug!(stage = "trace", outcome = "propagated", "Stage complete");

        if let Err(response) = self.authenticator.authenticate(&mut request).await {
            tracing::info!(
                stage = "auth",
                outcome = "rejected",
                status = response.status().as_u16(),
                "Request rejected"
            );
            return response;
        }
        tracing::debug!(stage = "auth", outcome = "accepted", "Stage complete");

        if let Err(e) = self.router.validate(&request) {
            tracing::info!(stage = "validate", outcome = "rejected", error = %e, "Request rejected");
            return e.into_response();
        }
        tracing::debug!(stage = "validate", outcome = "accepted", "Stage complete");

        let decision = self.router.route(&mut request).await;
        let target = self.target_for(&decision, ctx);
        ctx.timeout = target.timeout;
        tracing::info!(
            stage = "route",
            outcome = decision.outcome(),
            resource_type = ctx.resource_type.as_deref().unwrap_or("-"),
            upstream = %target.authority,
            timeout_secs = target.timeout.as_secs(),
            "Stage complete"
        );

        let response = self.upstream.forward(request, &target).await;
        tracing::info!(
            stage = "forward",
            status = response.status().as_u16(),
            upstream = ctx.upstream_label(),
            timeout_secs = ctx.timeout.as_secs(),
            elapsed_ms = ctx.started.elapsed().as_millis() as u64,
            "Request completed"
        );
        response
    }

    fn target_for(&self, decision: &RouteDecision, ctx: &mut RequestContext) -> UpstreamTarget {
        match decision {
            RouteDecision::NoOverride => self.default_target.clone(),
            RouteDecision::Fallback { resource_type, .. } => {
                ctx.resource_type = Some(resource_type.clone());
                self.default_target.clone()
            }
            RouteDecision::Dispatch {
                resource_type,
                instance,
                timeout,
                max_retries,
            } => {
                ctx.resource_type = Some(resource_type.clone());
                match UpstreamTarget::from_instance(instance, *timeout) {
                    Ok(target) => {
                        ctx.instance = Some(instance.address());
                        tracing::debug!(max_retries, "Retry budget left to the caller runtime");
                        target
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Cannot dispatch to instance, using default route");
                        self.default_target.clone()
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::extract::ConnectInfo;
    use axum::http::{HeaderMap, StatusCode};

    use crate::config::{RateLimitConfig, RegistryConfig, RoutingConfig};
    use crate::health::HealthChecker;
    use crate::http::X_REQUEST_ID;
    use crate::registry::{ServiceInfo, ServiceRegistry};
    use crate::routing::router::X_SELECTED_INSTANCE;
    use crate::security::identity::X_USER_ID;
    use crate::security::rate_limit::LocalCounter;
    use crate::store::MemoryStore;

    /// Records what it was asked to forward and answers 200.
    #[derive(Default)]
    struct RecordingUpstream {
        seen: Mutex<Vec<(HeaderMap, String)>>,
    }

    #[async_trait]
    impl Upstream for RecordingUpstream {
        async fn forward(&self, request: Request<Body>, target: &UpstreamTarget) -> Response {
            self.seen
                .lock()
                .unwrap()
                .push((request.headers().clone(), target.authority.to_string()));
            StatusCode::OK.into_response()
        }
    }

    struct Harness {
        registry: Arc<ServiceRegistry>,
        upstream: Arc<RecordingUpstream>,
        coordinator: Coordinator,
    }

    fn harness(limit: u64, burst: u64) -> Harness {
        harness_with(RateLimitConfig {
            limit,
            burst,
            ..RateLimitConfig::default()
        })
    }

    fn harness_with(config: RateLimitConfig) -> Harness {
        let registry = Arc::new(ServiceRegistry::new(
            Arc::new(MemoryStore::new()),
            RegistryConfig::default(),
            HealthChecker::new(Duration::from_secs(1)),
        ));
        let limiter = RateLimiter::new(Box::new(LocalCounter::new(Arc::new(MemoryStore::new()))), config);
        let router = RequestRouter::new(&RoutingConfig::default(), registry.clone()).unwrap();
        let upstream = Arc::new(RecordingUpstream::default());
        let default_target = UpstreamTarget::from_url("http://core-api:8000", Duration::from_secs(30)).unwrap();

        let coordinator = Coordinator::new(
            limiter,
            Arc::new(crate::gateway::PassThrough),
            router,
            upstream.clone(),
            default_target,
        );
        Harness {
            registry,
            upstream,
            coordinator,
        }
    }

    fn get(path: &str) -> Request<Body> {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    fn get_as(peer: &str, user: &str) -> Request<Body> {
        let mut request = Request::builder()
            .uri("/x")
            .header(X_USER_ID, user)
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(peer.parse::<SocketAddr>().unwrap()));
        request
    }

    #[tokio::test]
    async fn test_forged_user_ids_share_the_peer_counter() {
        let h = harness(1, 0);

        let first = h.coordinator.handle(get_as("198.51.100.4:5000", "forged-0")).await;
        assert_eq!(first.status(), StatusCode::OK);

        for i in 1..20 {
            let response = h
                .coordinator
                .handle(get_as("198.51.100.4:5000", &format!("forged-{}", i)))
                .await;
            assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS, "request {}", i);
        }

        let seen = h.upstream.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(!seen[0].0.contains_key(X_USER_ID));
    }

    #[tokio::test]
    async fn test_trusted_proxy_users_are_limited_separately() {
        let h = harness_with(RateLimitConfig {
            limit: 1,
            burst: 0,
            trusted_proxies: vec!["10.0.0.2".parse().unwrap()],
            ..RateLimitConfig::default()
        });

        for user in ["alice", "bob"] {
            let response = h.coordinator.handle(get_as("10.0.0.2:5000", user)).await;
            assert_eq!(response.status(), StatusCode::OK, "{}", user);
        }
        let response = h.coordinator.handle(get_as("10.0.0.2:5000", "alice")).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let seen = h.upstream.seen.lock().unwrap();
        assert_eq!(seen[1].0[X_USER_ID], "bob");
    }

    #[tokio::test]
    async fn test_request_id_round_trip() {
        let h = harness(10, 0);
        let request = Request::builder()
            .uri("/api/v1/users")
            .header(X_REQUEST_ID, "client-id-1")
            .body(Body::empty())
            .unwrap();

        let response = h.coordinator.handle(request).await;
        assert_eq!(response.headers()[X_REQUEST_ID], "client-id-1");

        let seen = h.upstream.seen.lock().unwrap();
        assert_eq!(seen[0].0[X_REQUEST_ID], "client-id-1");
        assert_eq!(seen[0].1, "core-api:8000");
    }

    #[tokio::test]
    async fn test_rejection_carries_request_id_and_skips_upstream() {
        let h = harness(1, 0);
        h.coordinator.handle(get("/a")).await;

        let response = h.coordinator.handle(get("/a")).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers()[X_REQUEST_ID].to_str().unwrap().starts_with("req_"));
        assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
        assert_eq!(h.upstream.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_to_registered_instance() {
        let h = harness(10, 0);
        h.registry
            .register(ServiceInfo::new("docking-executor", "10.0.0.9", 9100))
            .await
            .unwrap();

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/tasks/docking/execute")
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let response = h.coordinator.handle(request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-limit"], "10");

        let seen = h.upstream.seen.lock().unwrap();
        assert_eq!(seen[0].1, "10.0.0.9:9100");
        assert_eq!(seen[0].0[X_SELECTED_INSTANCE], "10.0.0.9:9100");
    }

    #[tokio::test]
    async fn test_validation_failure_never_reaches_upstream() {
        let h = harness(10, 0);
        let request = Request::builder()
            .method("POST")
            .uri("/tasks/docking/run")
            .header("content-type", "text/plain")
            .body(Body::empty())
            .unwrap();

        let response = h.coordinator.handle(request).await;
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert!(response.headers().contains_key(X_REQUEST_ID));
        assert!(h.upstream.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_healthy_instance_uses_default_backend() {
        let h = harness(10, 0);
        let response = h.coordinator.handle(get("/tasks/structure-prediction/status")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(h.upstream.seen.lock().unwrap()[0].1, "core-api:8000");
    }
}
