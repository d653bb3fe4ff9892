//! Caller identification for rate limiting.
//!
//! # Responsibilities
//! - Prefer the user id asserted by a trusted authenticating proxy
//! - Fall back to the client network address
//! - Drop `X-User-ID` sent by any other peer before it reaches upstreams
//!
//! # Design Decisions
//! - Only peers listed in `rate_limit.trusted_proxies` may assert a user id
//! - `anonymous` and empty user ids are treated as unauthenticated
//! - The identity key carries its scope so users and addresses never collide

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request};

/// Header set by the authentication collaborator.
pub const X_USER_ID: &str = "x-user-id";

/// Who is making a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallerIdentity {
    User(String),
    Address(String),
    Unknown,
}

impl CallerIdentity {
    /// Resolve from request headers and the peer address.
    pub fn resolve(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        let user = headers
            .get(X_USER_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty() && !id.eq_ignore_ascii_case("anonymous"));

        match (user, peer) {
            (Some(id), _) => CallerIdentity::User(id.to_string()),
            (None, Some(addr)) => CallerIdentity::Address(addr.ip().to_string()),
            (None, None) => CallerIdentity::Unknown,
        }
    }

    /// Resolve from a request whose service was built with connect info.
    ///
    /// An `X-User-ID` from a peer outside `trusted_proxies` is removed from
    /// the request, so the caller is keyed by address and upstreams never
    /// see a self-asserted identity.
    pub fn from_request<B>(request: &mut Request<B>, trusted_proxies: &[IpAddr]) -> Self {
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        let trusted = peer.is_some_and(|addr| trusted_proxies.contains(&addr.ip().to_canonical()));
        if !trusted && request.headers_mut().remove(X_USER_ID).is_some() {
            tracing::debug!(peer = ?peer, "Dropped X-User-ID from untrusted peer");
        }
        Self::resolve(request.headers(), peer)
    }

    /// Scope label used in counter keys and metrics.
    pub fn scope(&self) -> &'static str {
        match self {
            CallerIdentity::User(_) => "user",
            CallerIdentity::Address(_) => "ip",
            CallerIdentity::Unknown => "unknown",
        }
    }

    /// Counter key in the store.
    pub fn counter_key(&self) -> String {
        format!("rate_limit:{}", self)
    }
}

impl fmt::Display for CallerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallerIdentity::User(id) => write!(f, "user:{}", id),
            CallerIdentity::Address(ip) => write!(f, "ip:{}", ip),
            CallerIdentity::Unknown => write!(f, "unknown"),
        }
    }
}
