//! Shared key-value store subsystem.
//!
//! # Data Flow
//! ```text
//! Rate limiter (distributed) ──┐
//!                              ├─→ KeyValueStore ─→ memory.rs (in-process, DashMap + deadlines)
//! Service registry ────────────┘                 └→ redis.rs  (shared, one timeout per command)
//! ```
//!
//! # Design Decisions
//! - The store is the only source of cross-instance truth
//! - Expiry is delegated to the store; nothing sweeps records explicitly
//! - Every network command is bounded by a timeout; a timeout is just another `StoreError`
//! - No distributed locks; only atomic increment/expire/set primitives

pub mod memory;
pub mod redis;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

use crate::config::{StoreBackend, StoreConfig};

/// Errors surfaced by a store backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("unexpected value at '{key}': {reason}")]
    Corrupt { key: String, reason: String },
}

/// Primitives the gateway needs from a key-value store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Increment a counter and set `window` as its TTL if it has none yet,
    /// in a single round trip. Returns the counter value after increment.
    async fn increment_window(&self, key: &str, window: Duration) -> Result<i64, StoreError>;

    /// Set the TTL of an existing key. Returns false if the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Remove a key. Returns false if it did not exist.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Write hash fields. Existing TTL is preserved.
    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> Result<(), StoreError>;

    /// Write hash fields only if the key is still live, as one atomic step.
    /// Returns false, writing nothing, when the key is missing or expired.
    async fn hash_set_if_exists(
        &self,
        key: &str,
        fields: &[(String, String)],
    ) -> Result<bool, StoreError>;

    /// Read a whole hash. Missing or expired keys yield an empty map.
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;

    async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError>;

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// Cheap liveness probe used by readiness checks.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Build the configured store backend.
pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn KeyValueStore>, StoreError> {
    match config.backend {
        StoreBackend::Memory => {
            tracing::info!("Using in-process store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Redis => {
            let store = RedisStore::connect(
                &config.url,
                Duration::from_millis(config.op_timeout_ms),
            )
            .await?;
            tracing::info!(url = %config.url, "Connected to shared store");
            Ok(Arc::new(store))
        }
    }
}
