//! Service registry subsystem.
//!
//! # Data Flow
//! ```text
//! Control plane POST /registry/services
//!     → instance.rs (validate ServiceInfo, build ServiceInstance)
//!     → service.rs (instance hash + TTL, group set + TTL, service index)
//!
//! Router / HealthMonitor
//!     → service.rs discover / get_healthy / select
//!     → load_balancer (pick one instance)
//! ```
//!
//! # Design Decisions
//! - The store is the only source of truth; nothing cached in-process
//! - Expiry is delegated to store TTLs, there is no sweeper
//! - Backend errors propagate; callers decide how to degrade

pub mod instance;
pub mod service;

pub use instance::{
    HealthStatus, InstanceKey, InvalidService, RegistrationRequest, ServiceInfo, ServiceInstance,
};
pub use service::{RegistryError, ServiceRegistry};
