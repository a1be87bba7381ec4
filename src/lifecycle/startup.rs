//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate configuration
//! - Initialize all subsystems in dependency order
//! - Start background tasks (config watcher, metrics)
//! - Bind listeners and begin accepting traffic
//! - Drain the execution pool once the listener has stopped
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)
//! - Route registration happens in `build`, so a conflicting table never
//!   reaches the bind step

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::RecommendedWatcher;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::admin::{admin_routes, AdminDeps};
use crate::config::validation::validate_config;
use crate::config::watcher::{changed_sections, ConfigWatcher};
use crate::config::{ConfigError, EngineConfig};
use crate::dispatch::Dispatcher;
use crate::execution::{PoolError, PoolHandle, PoolSizes};
use crate::health::{HealthInspector, HealthMonitor, HttpProbeInspector, ServerStatus};
use crate::http::{AppState, HttpServer};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals;
use crate::observability::metrics;
use crate::routing::{RegistryError, RouteMeta, RouteRegistry};
use crate::security::{Authenticator, TokenAuthenticator};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("execution pool: {0}")]
    Pool(#[from] PoolError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Collects routes and collaborators, then assembles an [`Engine`].
pub struct EngineBuilder {
    config: EngineConfig,
    config_path: Option<PathBuf>,
    routes: Vec<RouteMeta>,
    authenticator: Option<Arc<dyn Authenticator>>,
    inspector: Option<Arc<dyn HealthInspector>>,
    shutdown: Shutdown,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            config_path: None,
            routes: Vec::new(),
            authenticator: None,
            inspector: None,
            shutdown: Shutdown::new(),
        }
    }

    /// Watch this file and apply `execution` changes live.
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn route(mut self, meta: RouteMeta) -> Self {
        self.routes.push(meta);
        self
    }

    pub fn routes(mut self, metas: impl IntoIterator<Item = RouteMeta>) -> Self {
        self.routes.extend(metas);
        self
    }

    /// Replace the token authenticator built from `security`.
    pub fn authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    /// Replace the HTTP probe inspector built from `health`.
    pub fn inspector(mut self, inspector: Arc<dyn HealthInspector>) -> Self {
        self.inspector = Some(inspector);
        self
    }

    pub fn shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn build(self) -> Result<Engine, StartupError> {
        let config = self.config;
        validate_config(&config).map_err(ConfigError::Validation)?;

        let sizes = PoolSizes::from_config(&config.execution)?;
        let pool = PoolHandle::new(sizes)?;
        tracing::info!(
            mode = ?config.execution.mode,
            core = sizes.core,
            max = sizes.max,
            queue = sizes.queue_capacity,
            "Execution pool ready"
        );

        let authenticator: Arc<dyn Authenticator> = match self.authenticator {
            Some(authenticator) => authenticator,
            None => Arc::new(TokenAuthenticator::new(&config.security)),
        };
        let status = Arc::new(ServerStatus::new());
        let inspector: Arc<dyn HealthInspector> = match self.inspector {
            Some(inspector) => inspector,
            None => Arc::new(HttpProbeInspector::new(&config.health, Arc::clone(&status))),
        };
        let monitor = Arc::new(HealthMonitor::new(
            Arc::clone(&inspector),
            config.health.interval(),
            self.shutdown.clone(),
        ));

        let admin = admin_routes(
            &config.admin.role,
            config.admin.loadtest_enabled,
            AdminDeps {
                authenticator: Arc::clone(&authenticator),
                inspector,
                status: Arc::clone(&status),
            },
        );
        let registry = RouteRegistry::builder().routes(self.routes).routes(admin).build()?;
        tracing::info!(routes = registry.len(), "Routes registered");

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(registry),
            authenticator,
            pool.clone(),
            Arc::clone(&monitor),
        ));

        Ok(Engine {
            config,
            config_path: self.config_path,
            dispatcher,
            pool,
            status,
            monitor,
            shutdown: self.shutdown,
        })
    }
}

/// A fully assembled server, ready to bind.
pub struct Engine {
    config: EngineConfig,
    config_path: Option<PathBuf>,
    dispatcher: Arc<Dispatcher>,
    pool: PoolHandle,
    status: Arc<ServerStatus>,
    monitor: Arc<HealthMonitor>,
    shutdown: Shutdown,
}

impl Engine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn pool(&self) -> &PoolHandle {
        &self.pool
    }

    pub fn status(&self) -> &Arc<ServerStatus> {
        &self.status
    }

    pub fn monitor(&self) -> &Arc<HealthMonitor> {
        &self.monitor
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    fn app_state(&self) -> AppState {
        AppState {
            dispatcher: Arc::clone(&self.dispatcher),
            status: Arc::clone(&self.status),
            monitor: Arc::clone(&self.monitor),
            max_body_bytes: self.config.listener.max_body_bytes,
        }
    }

    /// Process entry point: metrics, signals, bind, serve.
    pub async fn run(self) -> Result<(), StartupError> {
        let observability = &self.config.observability;
        if observability.metrics_enabled {
            match observability.metrics_address.parse::<SocketAddr>() {
                Ok(addr) => metrics::init_metrics(addr),
                Err(e) => tracing::error!(
                    metrics_address = %observability.metrics_address,
                    error = %e,
                    "Failed to parse metrics address"
                ),
            }
        }

        signals::spawn_signal_handler(self.shutdown.clone());

        let address = self.config.listener.bind_address.clone();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| StartupError::Bind { address, source })?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown, then drain.
    pub async fn serve(self, listener: TcpListener) -> Result<(), StartupError> {
        let _watcher = self.start_config_watcher();

        let server = HttpServer::new(self.app_state(), Duration::from_secs(self.config.timeouts.request_secs));
        let result = server.run(listener, self.shutdown.clone()).await;

        self.shutdown.trigger();
        tracing::info!(in_flight = self.dispatcher.in_flight(), "Draining execution pool");
        self.pool.shutdown().await;
        tracing::info!("Shutdown complete");

        result.map_err(StartupError::from)
    }

    /// A watch failure is logged; the server keeps running on the current
    /// configuration.
    fn start_config_watcher(&self) -> Option<RecommendedWatcher> {
        let path = self.config_path.as_ref()?;
        let (watcher, updates) = ConfigWatcher::new(path);
        match watcher.run() {
            Ok(handle) => {
                tokio::spawn(apply_updates(
                    self.config.clone(),
                    updates,
                    self.pool.clone(),
                    self.shutdown.clone(),
                ));
                Some(handle)
            }
            Err(e) => {
                tracing::error!(path = ?path, error = %e, "Config watcher failed to start, hot reload disabled");
                None
            }
        }
    }
}

async fn apply_updates(
    mut current: EngineConfig,
    mut updates: mpsc::UnboundedReceiver<EngineConfig>,
    pool: PoolHandle,
    shutdown: Shutdown,
) {
    loop {
        let next = tokio::select! {
            next = updates.recv() => match next {
                Some(next) => next,
                None => break,
            },
            _ = shutdown.wait() => break,
        };

        let changed = changed_sections(&current, &next);
        if changed.is_empty() {
            tracing::debug!("Config reloaded with no changes");
            continue;
        }

        for section in &changed {
            if *section == "execution" {
                let applied = match PoolSizes::from_config(&next.execution) {
                    Ok(sizes) => pool.reconfigure(sizes).await,
                    Err(e) => Err(e),
                };
                match applied {
                    Ok(()) => tracing::info!(generation = pool.generation(), "Execution pool reconfigured"),
                    Err(e) => tracing::error!(error = %e, "Execution pool reconfigure failed, keeping current pool"),
                }
            } else {
                tracing::warn!(section = %section, "Config section changed, restart required to apply");
            }
        }
        current = next;
    }
    tracing::debug!("Config update loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExecutionConfig, ThreadingMode};
    use crate::dispatch::handler::{Call, HandlerResult, Reply};
    use axum::http::Method;

    async fn ok(_call: Call) -> HandlerResult {
        Ok(Reply::empty())
    }

    #[tokio::test]
    async fn test_duplicate_route_fails_build() {
        let result = Engine::builder(EngineConfig::default())
            .route(RouteMeta::new(Method::GET, "/a", ok))
            .route(RouteMeta::new(Method::GET, "/a", ok))
            .build();
        assert!(matches!(result, Err(StartupError::Registry(_))));
    }

    #[tokio::test]
    async fn test_user_route_conflicting_with_admin_fails() {
        let result = Engine::builder(EngineConfig::default())
            .route(RouteMeta::new(Method::GET, "/version", ok))
            .build();
        assert!(matches!(result, Err(StartupError::Registry(_))));
    }

    #[tokio::test]
    async fn test_invalid_config_fails_build() {
        let mut config = EngineConfig::default();
        config.execution = ExecutionConfig {
            mode: ThreadingMode::Mixed,
            core_size: 4,
            max_size: 2,
            ..ExecutionConfig::default()
        };
        let result = Engine::builder(config).build();
        assert!(matches!(result, Err(StartupError::Config(ConfigError::Validation(_)))));
    }

    #[tokio::test]
    async fn test_reload_swaps_pool() {
        let config = EngineConfig::default();
        let pool = PoolHandle::new(PoolSizes::new(1, 1, 4).unwrap()).unwrap();
        let shutdown = Shutdown::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(apply_updates(config.clone(), rx, pool.clone(), shutdown.clone()));

        let mut next = config.clone();
        next.execution = ExecutionConfig {
            mode: ThreadingMode::Mixed,
            core_size: 2,
            max_size: 3,
            ..ExecutionConfig::default()
        };
        tx.send(next).unwrap();

        for _ in 0..200 {
            if pool.generation() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(pool.sizes().core, 2);
        assert_eq!(pool.sizes().max, 3);

        shutdown.trigger();
        task.await.unwrap();
    }
}
