//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use futures_util::future::BoxFuture;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use switchyard::config::{EngineConfig, ExecutionConfig, ThreadingMode, UserConfig};
use switchyard::dispatch::{Dispatcher, RequestContext, ResponseContext};
use switchyard::error::ErrorEntry;
use switchyard::execution::{PoolHandle, PoolSizes};
use switchyard::health::{HealthInspector, HealthMonitor};
use switchyard::lifecycle::{Engine, Shutdown, StartupError};
use switchyard::routing::{RouteMeta, RouteRegistry};
use switchyard::security::{AuthError, Authenticator, Caller};

/// Header carrying `id:role1,role2` for [`HeaderAuthenticator`].
pub const TEST_CALLER: &str = "x-test-caller";

/// Trusts whatever identity the test puts in [`TEST_CALLER`].
pub struct HeaderAuthenticator;

impl Authenticator for HeaderAuthenticator {
    fn authenticate(&self, headers: &HeaderMap) -> Option<Caller> {
        let raw = headers.get(TEST_CALLER)?.to_str().ok()?;
        let (id, roles) = raw.split_once(':').unwrap_or((raw, ""));
        Some(Caller::new(id, roles.split(',').filter(|r| !r.is_empty())))
    }

    fn login(&self, _username: &str, _password: &str) -> Result<String, AuthError> {
        Err(AuthError::MissingCredentials)
    }

    fn logout(&self, _headers: &HeaderMap) {}

    fn token_header(&self) -> &str {
        "x-authtoken"
    }
}

/// Counts pings and reports healthy.
#[derive(Default)]
pub struct CountingInspector {
    pub pings: AtomicUsize,
}

impl HealthInspector for CountingInspector {
    fn ping(&self, _deep: bool) -> BoxFuture<'_, Vec<ErrorEntry>> {
        Box::pin(async move {
            self.pings.fetch_add(1, Ordering::SeqCst);
            Vec::new()
        })
    }
}

pub fn pool(core: usize, max: usize, queue: usize) -> PoolHandle {
    PoolHandle::new(PoolSizes::new(core, max, queue).unwrap()).unwrap()
}

pub struct Harness {
    pub dispatcher: Arc<Dispatcher>,
    pub monitor: Arc<HealthMonitor>,
    pub inspector: Arc<CountingInspector>,
}

pub fn harness_with_pool(routes: Vec<RouteMeta>, pool: PoolHandle) -> Harness {
    let registry = RouteRegistry::builder().routes(routes).build().unwrap();
    let inspector = Arc::new(CountingInspector::default());
    let monitor = Arc::new(HealthMonitor::new(
        inspector.clone(),
        Duration::from_millis(20),
        Shutdown::new(),
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(registry),
        Arc::new(HeaderAuthenticator),
        pool,
        monitor.clone(),
    ));
    Harness {
        dispatcher,
        monitor,
        inspector,
    }
}

pub fn harness(routes: Vec<RouteMeta>) -> Harness {
    harness_with_pool(routes, pool(4, 4, 64))
}

pub fn request(method: Method, target: &str, headers: &[(&str, &str)], body: &str) -> RequestContext {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        map.insert(
            HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
    }
    RequestContext::new(method, target, map, Bytes::from(body.to_string())).with_request_id("test")
}

pub fn get(target: &str) -> RequestContext {
    request(Method::GET, target, &[], "")
}

pub fn json_body(response: &ResponseContext) -> serde_json::Value {
    serde_json::from_slice(&response.body).unwrap()
}

pub fn text_body(response: &ResponseContext) -> String {
    String::from_utf8(response.body.to_vec()).unwrap()
}

pub fn error_entries(response: &ResponseContext) -> Vec<ErrorEntry> {
    serde_json::from_slice(&response.body).unwrap()
}

pub fn assert_status(response: &ResponseContext, status: StatusCode) {
    assert_eq!(
        response.status,
        status,
        "unexpected status, body: {}",
        String::from_utf8_lossy(&response.body)
    );
}

/// Config for an in-process server: one admin user, small mixed pool.
pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.execution = ExecutionConfig {
        mode: ThreadingMode::Mixed,
        core_size: 2,
        max_size: 4,
        queue_capacity: 32,
        ..ExecutionConfig::default()
    };
    config.security.users.push(UserConfig {
        username: "ops".into(),
        password: "secret".into(),
        roles: vec!["admin".into()],
        groups: Vec::new(),
    });
    config.admin.loadtest_enabled = true;
    config
}

pub struct RunningServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub task: JoinHandle<Result<(), StartupError>>,
}

impl RunningServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = tokio::time::timeout(Duration::from_secs(5), self.task).await;
    }
}

/// Build an engine with `routes` and serve it on an ephemeral port.
pub async fn spawn_server(config: EngineConfig, routes: Vec<RouteMeta>, inspector: Arc<dyn HealthInspector>) -> RunningServer {
    let engine = Engine::builder(config)
        .routes(routes)
        .inspector(inspector)
        .build()
        .unwrap();
    let shutdown = engine.shutdown_handle();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let task = tokio::spawn(engine.serve(listener));
    RunningServer { addr, shutdown, task }
}
