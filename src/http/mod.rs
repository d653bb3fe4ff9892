//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, probes, middleware)
//!     → gateway::Coordinator (every other path)
//!         → request.rs (correlation id)
//!         → response.rs (JSON errors, hop-by-hop stripping)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestId, RequestTracer, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
