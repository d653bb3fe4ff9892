//! Request correlation.
//!
//! # Responsibilities
//! - Reuse an inbound `X-Request-ID` verbatim
//! - Otherwise generate `req_{unix_seconds}_{8 hex}`
//! - Stamp the id on the forwarded request and on the response
//!
//! # Design Decisions
//! - Request ID resolved as early as possible for tracing
//! - An id that is not a valid header string is replaced, never repaired

use std::fmt;

use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::clock::unix_secs;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Correlation id of one request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn header_value(&self) -> Option<HeaderValue> {
        HeaderValue::from_str(&self.0).ok()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolves and propagates request ids.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestTracer;

impl RequestTracer {
    pub fn new() -> Self {
        Self
    }

    /// The inbound id when usable, a fresh one otherwise.
    pub fn get_or_create(&self, headers: &HeaderMap) -> RequestId {
        headers
            .get(&X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .filter(|id| !id.trim().is_empty())
            .map(|id| RequestId(id.to_string()))
            .unwrap_or_else(Self::generate)
    }

    pub fn generate() -> RequestId {
        RequestId(format!("req_{}_{:08x}", unix_secs(), rand::random::<u32>()))
    }

    /// Set the id on a header map (forwarded request or response).
    pub fn propagate(&self, id: &RequestId, headers: &mut HeaderMap) {
        match id.header_value() {
            Some(value) => {
                headers.insert(X_REQUEST_ID, value);
            }
            None => tracing::warn!(request_id = %id, "Request id is not a valid header value"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_id_reused_verbatim() {
        let mut headers = HeaderMap::new();
        headers.insert(X_REQUEST_ID, HeaderValue::from_static("abc-123"));

        let id = RequestTracer::new().get_or_create(&headers);
        assert_eq!(id.as_str(), "abc-123");
    }

    #[test]
    fn test_generated_id_format() {
        let id = RequestTracer::new().get_or_create(&HeaderMap::new());
        let parts: Vec<&str> = id.as_str().split('_').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "req");
        assert!(parts[1].parse::<u64>().is_ok());
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_blank_inbound_id_is_replaced() {
        let mut headers = HeaderMap::new();
        headers.insert(X_REQUEST_ID, HeaderValue::from_static("  "));
        let id = RequestTracer::new().get_or_create(&headers);
        assert!(id.as_str().starts_with("req_"));
    }

    #[test]
    fn test_propagate_overwrites() {
        let tracer = RequestTracer::new();
        let mut headers = HeaderMap::new();
        headers.insert(X_REQUEST_ID, HeaderValue::from_static("old"));
        let id = RequestTracer::generate();

        tracer.propagate(&id, &mut headers);
        assert_eq!(headers.get(&X_REQUEST_ID).unwrap(), id.as_str());
    }
}
