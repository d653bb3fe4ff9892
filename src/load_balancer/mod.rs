//! Instance selection.
//!
//! # Data Flow
//! ```text
//! Router resolved a service with healthy instances
//!     → ServiceRegistry::select
//!     → Apply configured algorithm:
//!         - time_slice.rs (unix seconds modulo instance count)
//!         - round_robin.rs (rotate a per-process cursor)
//!     → Return one instance or None for an empty list
//! ```
//!
//! # Design Decisions
//! - Selectors see an already filtered, stably ordered slice
//! - Health filtering happens in the registry, not here
//! - Algorithm chosen once at startup from configuration

pub mod round_robin;
pub mod time_slice;

pub use round_robin::RoundRobin;
pub use time_slice::TimeSlice;

use crate::config::SelectionStrategy;
use crate::registry::ServiceInstance;

/// Picks one instance out of a candidate list.
pub trait LoadBalancer: Send + Sync + std::fmt::Debug {
    /// Returns `None` only when `instances` is empty.
    fn select<'a>(&self, instances: &'a [ServiceInstance]) -> Option<&'a ServiceInstance>;

    fn name(&self) -> &'static str;
}

/// Build the selector for a configured strategy.
pub fn from_strategy(strategy: SelectionStrategy) -> Box<dyn LoadBalancer> {
    match strategy {
        SelectionStrategy::TimeSlice => Box::new(TimeSlice),
        SelectionStrategy::RoundRobin => Box::new(RoundRobin::new()),
    }
}
