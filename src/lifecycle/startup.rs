//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order
//! - Start background tasks (health monitor, local cache janitor)
//! - Bind listeners and begin accepting traffic
//!
//! # Design Decisions
//! - Subsystems initialize in order, not concurrently
//! - The store is injected so tests can run the whole gateway in memory

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::time;

use crate::admin::{self, auth::AdminToken, handlers::AdminState};
use crate::config::GatewayConfig;
use crate::gateway::{Coordinator, HttpUpstream, PassThrough, UpstreamTarget};
use crate::health::{HealthChecker, HealthMonitor};
use crate::http::server::{self, AppState, HttpServer};
use crate::lifecycle::Shutdown;
use crate::registry::ServiceRegistry;
use crate::routing::RequestRouter;
use crate::security::RateLimiter;
use crate::store::{self, KeyValueStore, MemoryStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),
    #[error("invalid routing table: {0}")]
    Routing(String),
    #[error("invalid default upstream: {0}")]
    Upstream(String),
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// A fully wired gateway, ready to serve.
pub struct Gateway {
    config: GatewayConfig,
    registry: Arc<ServiceRegistry>,
    monitor: Arc<HealthMonitor>,
    local_cache: Arc<MemoryStore>,
    data_plane: HttpServer,
}

impl Gateway {
    /// Connect the configured store and wire everything.
    pub async fn build(config: GatewayConfig) -> Result<Self, StartupError> {
        let store = store::connect(&config.store).await?;
        Self::with_store(config, store)
    }

    pub fn with_store(config: GatewayConfig, store: Arc<dyn KeyValueStore>) -> Result<Self, StartupError> {
        let checker = HealthChecker::new(Duration::from_secs(config.health_check.timeout_secs));
        let registry = Arc::new(ServiceRegistry::new(store.clone(), config.registry.clone(), checker));

        let local_cache = Arc::new(MemoryStore::new());
        let mut rate_limit = config.rate_limit.clone();
        rate_limit.strategy = Some(rate_limit.effective_strategy(config.store.backend));
        let limiter = RateLimiter::from_config(rate_limit, local_cache.clone(), store);

        let router = RequestRouter::new(&config.routing, registry.clone()).map_err(StartupError::Routing)?;
        let default_target = UpstreamTarget::from_url(
            &config.upstream.default_backend,
            Duration::from_secs(config.upstream.default_timeout_secs),
        )
        .map_err(StartupError::Upstream)?;

        let coordinator = Arc::new(Coordinator::new(
            limiter,
            Arc::new(PassThrough),
            router,
            Arc::new(HttpUpstream::new()),
            default_target,
        ));
        let monitor = Arc::new(HealthMonitor::new(registry.clone(), config.health_check.clone()));

        let data_plane = HttpServer::new(
            AppState {
                coordinator,
                registry: registry.clone(),
            },
            &config.listener,
            Duration::from_secs(config.timeouts.request_secs),
        );

        Ok(Self {
            config,
            registry,
            monitor,
            local_cache,
            data_plane,
        })
    }

    pub fn registry(&self) -> Arc<ServiceRegistry> {
        self.registry.clone()
    }

    pub fn data_router(&self) -> Router {
        self.data_plane.router()
    }

    pub fn admin_router(&self) -> Router {
        let state = AdminState {
            registry: self.registry.clone(),
            monitor: self.monitor.clone(),
        };
        let token = AdminToken(self.config.admin.api_key.as_deref().map(Arc::from));
        admin::setup_admin_router(state, token)
    }

    /// Bind the configured addresses and serve until shutdown.
    pub async fn run(self, shutdown: &Shutdown) -> Result<(), StartupError> {
        let data = bind(&self.config.listener.bind_address).await?;
        let admin = if self.config.admin.enabled {
            Some(bind(&self.config.admin.bind_address).await?)
        } else {
            tracing::info!("Control plane disabled");
            None
        };
        self.serve(data, admin, shutdown).await
    }

    /// Serve on already bound listeners until shutdown.
    pub async fn serve(
        self,
        data: TcpListener,
        admin: Option<TcpListener>,
        shutdown: &Shutdown,
    ) -> Result<(), StartupError> {
        if self.config.health_check.enabled {
            tokio::spawn(self.monitor.clone().run(shutdown.subscribe()));
        }
        spawn_cache_janitor(
            self.local_cache.clone(),
            Duration::from_secs(self.config.rate_limit.window_secs.max(1)),
            shutdown,
        );

        let admin_server = match admin {
            Some(listener) => Some(tokio::spawn(server::serve(
                listener,
                self.admin_router(),
                shutdown.subscribe(),
                "control plane",
            ))),
            None => None,
        };

        self.data_plane.run(data, shutdown.subscribe()).await?;

        if let Some(handle) = admin_server {
            match handle.await {
                Ok(result) => result?,
                Err(e) => tracing::error!(error = %e, "Control plane task failed"),
            }
        }
        Ok(())
    }
}

async fn bind(address: &str) -> Result<TcpListener, StartupError> {
    TcpListener::bind(address).await.map_err(|source| StartupError::Bind {
        address: address.to_string(),
        source,
    })
}

/// Periodically drop expired local rate-limit counters.
fn spawn_cache_janitor(cache: Arc<MemoryStore>, every: Duration, shutdown: &Shutdown) {
    let mut shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let mut ticker = time::interval(every);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let purged = cache.purge_expired();
                    if purged > 0 {
                        tracing::debug!(purged, "Purged expired local counters");
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
    });
}
