//! Registry operations over the shared key-value store.
//!
//! # Responsibilities
//! - Register, refresh and remove instances
//! - Discover instances of a service and filter the healthy ones
//! - Probe instances and record their health
//! - Select one instance for a request
//!
//! # Key Layout
//! ```text
//! service:{name}:{host}:{port}   hash, instance TTL
//! services:{name}                set of instance keys, group TTL
//! services:index                 set of service names, group TTL
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::clock::unix_secs;
use crate::config::RegistryConfig;
use crate::health::{HealthChecker, HealthReport};
use crate::load_balancer::{self, LoadBalancer};
use crate::registry::{HealthStatus, InstanceKey, InvalidService, ServiceInfo, ServiceInstance};
use crate::store::{KeyValueStore, StoreError};

/// Set of every registered service name.
pub const SERVICE_INDEX_KEY: &str = "services:index";

fn group_key(name: &str) -> String {
    format!("services:{}", name)
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("invalid service: {0}")]
    InvalidService(#[from] InvalidService),
    #[error("registry backend error: {0}")]
    Backend(#[from] StoreError),
    #[error("no services available")]
    NoServicesAvailable,
}

pub struct ServiceRegistry {
    store: Arc<dyn KeyValueStore>,
    config: RegistryConfig,
    balancer: Box<dyn LoadBalancer>,
    checker: HealthChecker,
}

impl ServiceRegistry {
    pub fn new(store: Arc<dyn KeyValueStore>, config: RegistryConfig, checker: HealthChecker) -> Self {
        let balancer = load_balancer::from_strategy(config.selection);
        Self {
            store,
            config,
            balancer,
            checker,
        }
    }

    /// Replace the selection algorithm.
    pub fn with_balancer(mut self, balancer: Box<dyn LoadBalancer>) -> Self {
        self.balancer = balancer;
        self
    }

    fn instance_ttl(&self) -> Duration {
        Duration::from_secs(self.config.instance_ttl_secs)
    }

    fn group_ttl(&self) -> Duration {
        Duration::from_secs(self.config.group_ttl_secs)
    }

    /// Upsert an instance. Re-registration overwrites every field, marks the
    /// instance healthy and renews all TTLs.
    pub async fn register(&self, info: ServiceInfo) -> Result<ServiceInstance, RegistryError> {
        info.validate()?;
        let instance = ServiceInstance::from_info(info, unix_secs(), self.config.instance_ttl_secs);
        let key = instance.key().to_string();
        let group = group_key(&instance.name);

        self.store.hash_set(&key, &instance.to_fields()).await?;
        self.store.expire(&key, self.instance_ttl()).await?;
        self.touch_group(&instance.name, &group, &key).await?;

        tracing::info!(
            service = %instance.name,
            instance = %instance.address(),
            ttl_secs = self.config.instance_ttl_secs,
            "Service registered"
        );
        Ok(instance)
    }

    async fn touch_group(&self, name: &str, group: &str, key: &str) -> Result<(), StoreError> {
        self.store.set_add(group, key).await?;
        self.store.expire(group, self.group_ttl()).await?;
        self.store.set_add(SERVICE_INDEX_KEY, name).await?;
        self.store.expire(SERVICE_INDEX_KEY, self.group_ttl()).await?;
        Ok(())
    }

    /// All live instances of a service, ordered by `(host, port)`.
    ///
    /// Group members whose record expired or cannot be parsed are skipped.
    pub async fn discover(&self, name: &str) -> Result<Vec<ServiceInstance>, RegistryError> {
        let members = self.store.set_members(&group_key(name)).await?;
        let mut instances = Vec::with_capacity(members.len());

        for key in members {
            let fields = match self.store.hash_get_all(&key).await {
                Ok(fields) => fields,
                Err(e) => {
                    tracing::debug!(key = %key, error = %e, "Skipping unreadable instance");
                    continue;
                }
            };
            if fields.is_empty() {
                tracing::debug!(key = %key, "Skipping expired instance");
                continue;
            }
            match ServiceInstance::from_fields(&fields) {
                Ok(instance) => instances.push(instance),
                Err(reason) => tracing::debug!(key = %key, reason = %reason, "Skipping corrupt instance"),
            }
        }

        instances.sort_by(|a, b| (a.host.as_str(), a.port).cmp(&(b.host.as_str(), b.port)));
        Ok(instances)
    }

    /// Healthy subset of `discover`.
    pub async fn get_healthy(&self, name: &str) -> Result<Vec<ServiceInstance>, RegistryError> {
        let mut instances = self.discover(name).await?;
        instances.retain(ServiceInstance::is_healthy);
        Ok(instances)
    }

    /// Remove an instance. Returns false when it was not registered.
    pub async fn deregister(&self, name: &str, host: &str, port: u16) -> Result<bool, RegistryError> {
        let key = InstanceKey::new(name, host, port).to_string();
        let removed = self.store.delete(&key).await?;
        self.store.set_remove(&group_key(name), &key).await?;

        if removed {
            tracing::info!(service = %name, instance = %format!("{}:{}", host, port), "Service deregistered");
        }
        Ok(removed)
    }

    /// Overwrite the status field only. The TTL is left as is; returns false
    /// when the instance has already expired so it is never resurrected.
    pub async fn update_health(&self, key: &InstanceKey, healthy: bool) -> Result<bool, RegistryError> {
        let status = HealthStatus::from(healthy);
        let written = self
            .store
            .hash_set_if_exists(
                &key.to_string(),
                &[("status".to_string(), status.as_str().to_string())],
            )
            .await?;
        Ok(written)
    }

    /// Record a successful probe: healthy, `last_seen = now`, TTLs renewed.
    pub async fn refresh(&self, instance: &ServiceInstance) -> Result<bool, RegistryError> {
        let key = instance.key().to_string();
        let fields = [
            ("status".to_string(), HealthStatus::Healthy.as_str().to_string()),
            ("last_seen".to_string(), unix_secs().to_string()),
        ];
        if !self.store.hash_set_if_exists(&key, &fields).await? {
            return Ok(false);
        }
        self.store.expire(&key, self.instance_ttl()).await?;
        self.touch_group(&instance.name, &group_key(&instance.name), &key).await?;
        Ok(true)
    }

    /// Probe one instance. Does not write anything.
    pub async fn health_check(&self, instance: &ServiceInstance) -> HealthReport {
        self.checker.check(instance).await
    }

    /// Pick one instance with the configured algorithm.
    pub fn select(&self, instances: &[ServiceInstance]) -> Result<ServiceInstance, RegistryError> {
        self.balancer
            .select(instances)
            .cloned()
            .ok_or(RegistryError::NoServicesAvailable)
    }

    /// Names of every service registered within the group TTL.
    pub async fn services(&self) -> Result<Vec<String>, RegistryError> {
        let mut names = self.store.set_members(SERVICE_INDEX_KEY).await?;
        names.sort();
        Ok(names)
    }

    pub async fn ping(&self) -> Result<(), RegistryError> {
        Ok(self.store.ping().await?)
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("config", &self.config)
            .field("balancer", &self.balancer.name())
            .finish()
    }
}
