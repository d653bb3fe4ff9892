//! Response helpers.
//!
//! # Responsibilities
//! - Build structured JSON error responses
//! - Strip hop-by-hop headers from proxied messages
//!
//! # Design Decisions
//! - Every gateway-generated error has the shape `{error, message}`
//! - Upstream timeouts map to 504, connection failures to 502

use axum::http::{header, HeaderMap, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Headers that apply to a single connection and must not be forwarded.
const HOP_BY_HOP: [HeaderName; 6] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::UPGRADE,
];

/// JSON error body with the given status.
pub fn json_error(status: StatusCode, error: &str, message: impl Into<String>) -> Response {
    let body = json!({
        "error": error,
        "message": message.into(),
    });
    (status, Json(body)).into_response()
}

pub fn bad_gateway(message: impl Into<String>) -> Response {
    json_error(StatusCode::BAD_GATEWAY, "bad_gateway", message)
}

pub fn gateway_timeout(message: impl Into<String>) -> Response {
    json_error(StatusCode::GATEWAY_TIMEOUT, "gateway_timeout", message)
}

/// Remove hop-by-hop headers, including any named in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
    headers.remove("keep-alive");
    headers.remove("transfer-encoding");
}
