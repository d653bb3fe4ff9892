//! Request pipeline.
//!
//! # Data Flow
//! ```text
//! Data-plane request
//!     → coordinator.rs
//!         1. rate limit (security::RateLimiter)       → 429 short-circuit
//!         2. correlation id (http::RequestTracer)
//!         3. auth.rs (Authenticator collaborator)    → its own rejection
//!         4. validate (routing::RequestRouter)        → 405 / 415
//!         5. route (routing::RequestRouter)           → target
//!         6. upstream.rs (forward with timeout)       → 502 / 504 on failure
//! ```
//!
//! # Design Decisions
//! - Stages run strictly in order; each logs one line with its outcome
//! - context.rs carries per-request facts and is never shared
//! - Anything a stage cannot handle degrades to the default route

pub mod auth;
pub mod context;
pub mod coordinator;
pub mod upstream;

pub use auth::{Authenticator, PassThrough};
pub use context::RequestContext;
pub use coordinator::Coordinator;
pub use upstream::{HttpUpstream, Upstream, UpstreamTarget};
