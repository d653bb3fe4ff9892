//! Fixed-window rate limiting with a burst allowance.
//!
//! A request is rejected once the window count exceeds `limit + burst`.
//! Two interchangeable counters back the window:
//! - [`LocalCounter`]: process-local TTL cache, approximate across replicas
//! - [`DistributedCounter`]: shared store, consistent across replicas
//!
//! Infrastructure failures never block traffic: a counter error yields an
//! allowed decision with `current = 0`.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::clock::unix_secs;
use crate::config::{RateLimitConfig, RateLimitStrategy};
use crate::observability::metrics;
use crate::security::identity::CallerIdentity;
use crate::store::{KeyValueStore, MemoryStore, StoreError};

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// A window counter the limiter can increment.
#[async_trait]
pub trait WindowCounter: Send + Sync {
    /// Strategy label for logs.
    fn name(&self) -> &'static str;

    /// Increment `key` for the current window and return the new count.
    async fn increment(&self, key: &str, window: Duration) -> Result<i64, StoreError>;
}

/// Counter kept in an injected process-local cache.
pub struct LocalCounter {
    cache: Arc<MemoryStore>,
}

impl LocalCounter {
    pub fn new(cache: Arc<MemoryStore>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl WindowCounter for LocalCounter {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn increment(&self, key: &str, window: Duration) -> Result<i64, StoreError> {
        self.cache.increment(key, window)
    }
}

/// Counter kept in the shared store; one round trip per request.
pub struct DistributedCounter {
    store: Arc<dyn KeyValueStore>,
}

impl DistributedCounter {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl WindowCounter for DistributedCounter {
    fn name(&self) -> &'static str {
        "distributed"
    }

    async fn increment(&self, key: &str, window: Duration) -> Result<i64, StoreError> {
        self.store.increment_window(key, window).await
    }
}

/// Outcome of one rate-limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub current: u64,
    pub limit: u64,
    pub burst: u64,
    pub window: Duration,
    /// Unix seconds at which the caller may assume a fresh window.
    pub reset_at: u64,
    /// True when the counter failed and the decision was taken without it.
    pub fail_open: bool,
}

impl RateDecision {
    /// Requests left before the nominal limit (burst not included).
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.current)
    }

    /// Seconds a rejected caller should wait.
    pub fn retry_after(&self) -> u64 {
        self.window.as_secs()
    }

    /// Set the `X-RateLimit-*` headers.
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(self.remaining()));
        headers.insert(X_RATELIMIT_RESET, HeaderValue::from(self.reset_at));
    }

    /// The 429 response for a rejected decision.
    pub fn rejection(&self) -> Response {
        let body = RateLimitBody {
            error: "rate_limit_exceeded",
            message: format!(
                "Rate limit of {} requests per {}s exceeded",
                self.limit,
                self.window.as_secs()
            ),
            limit: self.limit,
            current: self.current,
            retry_after: self.retry_after(),
        };

        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        let headers = response.headers_mut();
        self.apply_headers(headers);
        headers.insert(header::RETRY_AFTER, HeaderValue::from(self.retry_after()));
        response
    }
}

#[derive(Debug, Serialize)]
struct RateLimitBody {
    error: &'static str,
    message: String,
    limit: u64,
    current: u64,
    retry_after: u64,
}

/// Fixed-window rate limiter over a pluggable counter.
pub struct RateLimiter {
    counter: Box<dyn WindowCounter>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(counter: Box<dyn WindowCounter>, config: RateLimitConfig) -> Self {
        Self { counter, config }
    }

    /// Build the strategy named in `config`.
    ///
    /// `local_cache` backs the local strategy, `store` the distributed one.
    pub fn from_config(
        config: RateLimitConfig,
        local_cache: Arc<MemoryStore>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let counter: Box<dyn WindowCounter> = match config.strategy.unwrap_or(RateLimitStrategy::Local) {
            RateLimitStrategy::Local => Box::new(LocalCounter::new(local_cache)),
            RateLimitStrategy::Distributed => Box::new(DistributedCounter::new(store)),
        };
        tracing::info!(
            strategy = counter.name(),
            limit = config.limit,
            burst = config.burst,
            window_secs = config.window_secs,
            "Rate limiter configured"
        );
        Self::new(counter, config)
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Peers whose `X-User-ID` is taken as the caller identity.
    pub fn trusted_proxies(&self) -> &[IpAddr] {
        &self.config.trusted_proxies
    }

    /// Check a caller against the configured limits.
    pub async fn check(&self, identity: &CallerIdentity) -> RateDecision {
        let decision = self
            .apply(
                &identity.counter_key(),
                self.config.limit,
                Duration::from_secs(self.config.window_secs),
                self.config.burst,
            )
            .await;

        if !decision.allowed {
            tracing::warn!(
                identifier = %identity,
                current = decision.current,
                limit = decision.limit,
                burst = decision.burst,
                "Rate limit exceeded"
            );
            metrics::record_rate_limited(identity.scope());
        }
        decision
    }

    /// Count one request for `identifier` and decide whether it may proceed.
    pub async fn apply(
        &self,
        identifier: &str,
        limit: u64,
        window: Duration,
        burst: u64,
    ) -> RateDecision {
        let reset_at = unix_secs() + window.as_secs();

        let (current, fail_open) = match self.counter.increment(identifier, window).await {
            Ok(count) => (count.max(0) as u64, false),
            Err(e) => {
                tracing::warn!(
                    identifier = %identifier,
                    strategy = self.counter.name(),
                    error = %e,
                    "Rate limit counter unavailable, allowing request"
                );
                metrics::record_rate_limit_fail_open();
                (0, true)
            }
        };

        RateDecision {
            allowed: fail_open || current <= limit.saturating_add(burst),
            current,
            limit,
            burst,
            window,
            reset_at,
            fail_open,
        }
    }
}
