//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Periodic timer (active.rs)
//!     → ServiceRegistry::services (service index)
//!     → discover each service
//!     → checker.rs probes every instance
//!     → state.rs settles the verdict (hysteresis)
//!     → Healthy: registry.refresh / Unhealthy: registry.update_health(false)
//! ```
//!
//! # Design Decisions
//! - State transitions require consecutive successes/failures
//! - Pending verdicts write nothing, so TTLs keep running
//! - The monitor stops on the shutdown broadcast

pub mod active;
pub mod checker;
pub mod state;

pub use active::HealthMonitor;
pub use checker::{HealthChecker, HealthReport};
pub use state::{HealthTracker, Verdict};
