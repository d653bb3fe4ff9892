//! Task gateway library: rate limiting, service registry and resource-type
//! routing in front of task executor services.

pub mod admin;
pub mod clock;
pub mod config;
pub mod gateway;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod registry;
pub mod routing;
pub mod security;
pub mod store;

pub use config::GatewayConfig;
pub use lifecycle::{Gateway, Shutdown};
