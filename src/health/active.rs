//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every registered instance
//! - Feed results through the hysteresis tracker into the registry

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::HealthCheckConfig;
use crate::health::{HealthReport, HealthTracker, Verdict};
use crate::observability::metrics;
use crate::registry::{RegistryError, ServiceInstance, ServiceRegistry};

pub struct HealthMonitor {
    registry: Arc<ServiceRegistry>,
    config: HealthCheckConfig,
    tracker: HealthTracker,
}

impl HealthMonitor {
    pub fn new(registry: Arc<ServiceRegistry>, config: HealthCheckConfig) -> Self {
        let tracker = HealthTracker::new(config.healthy_threshold, config.unhealthy_threshold);
        Self {
            registry,
            config,
            tracker,
        }
    }

    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Active health checks disabled");
            return;
        }

        tracing::info!(
            interval_secs = self.config.interval_secs,
            timeout_secs = self.config.timeout_secs,
            "Health monitor starting"
        );

        let mut ticker = time::interval(Duration::from_secs(self.config.interval_secs.max(1)));
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.check_all().await {
                        tracing::warn!(error = %e, "Health check round failed");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// One round over every service in the index.
    pub async fn check_all(&self) -> Result<(), RegistryError> {
        let mut live = HashSet::new();
        for name in self.registry.services().await? {
            match self.check_service(&name).await {
                Ok(results) => {
                    live.extend(results.iter().map(|(instance, _)| instance.key().to_string()));
                }
                Err(e) => tracing::warn!(service = %name, error = %e, "Failed to check service"),
            }
        }
        self.tracker.retain(&live);
        Ok(())
    }

    /// Probe every instance of one service concurrently and apply verdicts.
    pub async fn check_service(
        &self,
        name: &str,
    ) -> Result<Vec<(ServiceInstance, HealthReport)>, RegistryError> {
        let instances = self.registry.discover(name).await?;
        let reports = join_all(instances.iter().map(|i| self.registry.health_check(i))).await;

        let results: Vec<_> = instances.into_iter().zip(reports).collect();
        for (instance, report) in &results {
            self.apply(instance, report).await;
        }
        Ok(results)
    }

    async fn apply(&self, instance: &ServiceInstance, report: &HealthReport) {
        let key = instance.key();
        let verdict = self.tracker.record(&key.to_string(), report.healthy);

        let outcome = match verdict {
            Verdict::Healthy => self.registry.refresh(instance).await,
            Verdict::Unhealthy => self.registry.update_health(&key, false).await,
            Verdict::Pending => {
                tracing::debug!(instance = %key, detail = %report.detail, "Health verdict pending");
                return;
            }
        };

        let healthy = verdict == Verdict::Healthy;
        match outcome {
            Ok(true) => {
                if healthy != instance.is_healthy() {
                    tracing::info!(
                        service = %instance.name,
                        instance = %instance.address(),
                        healthy,
                        detail = %report.detail,
                        "Instance health changed"
                    );
                }
                metrics::record_instance_health(&instance.name, &instance.address(), healthy);
            }
            Ok(false) => {
                tracing::debug!(instance = %key, "Instance expired before health update");
            }
            Err(e) => {
                tracing::warn!(instance = %key, error = %e, "Failed to record instance health");
            }
        }
    }
}
