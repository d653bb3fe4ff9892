//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path, headers)
//!     → matcher.rs (capture task type from configured patterns)
//!     → router.rs (route policy lookup, healthy instance selection)
//!     → Return: NoOverride, Fallback or Dispatch
//! ```
//!
//! # Design Decisions
//! - Patterns compiled at startup, immutable at runtime
//! - No regex in hot path (segment comparison only)
//! - First matching pattern wins

pub mod matcher;
pub mod router;

pub use matcher::PathPattern;
pub use router::{RequestRouter, RouteDecision, ValidationError};
