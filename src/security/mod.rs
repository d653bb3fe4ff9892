//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → identity.rs (authenticated user id, else client address)
//!     → rate_limit.rs (fixed window + burst, local or distributed counter)
//!     → Pass to tracer, auth collaborator, routing
//! ```
//!
//! # Design Decisions
//! - Fail open: an unreachable counter never blocks traffic
//! - Rate-limit headers are set on every response, allowed or not
//! - Strategy is an explicit configuration choice, never inferred

pub mod identity;
pub mod rate_limit;

pub use identity::CallerIdentity;
pub use rate_limit::{RateDecision, RateLimiter};
