//! Authentication seam.
//!
//! Authentication itself lives outside the gateway. An implementation may
//! set `X-User-ID` on the request or reject it with its own response.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use axum::response::Response;

#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, request: &mut Request<Body>) -> Result<(), Response>;
}

/// Accepts every request unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

#[async_trait]
impl Authenticator for PassThrough {
    async fn authenticate(&self, _request: &mut Request<Body>) -> Result<(), Response> {
        Ok(())
    }
}
