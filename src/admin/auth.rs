//! Optional bearer-token guard for the control plane.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::http::response::json_error;

/// Expected token, or `None` when the control plane is open.
#[derive(Debug, Clone, Default)]
pub struct AdminToken(pub Option<Arc<str>>);

pub async fn admin_auth_middleware(
    State(token): State<AdminToken>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected) = token.0.as_deref() else {
        return next.run(request).await;
    };

    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if presented == Some(expected) {
        next.run(request).await
    } else {
        tracing::warn!(path = %request.uri().path(), "Rejected control-plane request without valid token");
        json_error(StatusCode::UNAUTHORIZED, "unauthorized", "missing or invalid bearer token").into_response()
    }
}
