//! Request dispatch.
//!
//! # Responsibilities
//! - Drive one request through resolve → authorize → bind → invoke → serialize
//! - Hand the invocation to the execution pool and wait for its result
//! - Turn every failure into a complete, structured response
//!
//! # Design Decisions
//! - Resolution, authorization and binding run on the network task; they are
//!   cheap and read-only
//! - Invocation, serialization and failure classification run on a pool
//!   worker
//! - Nothing escapes: handler errors are classified, panics become 500s, a
//!   lost worker reply becomes a 500 and a full pool becomes a 503

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::header::ACCEPT;
use axum::http::StatusCode;
use futures_util::FutureExt;
use tokio::sync::oneshot;

use crate::binding::binder::ParameterBinder;
use crate::dispatch::context::{RequestContext, ResponseContext};
use crate::dispatch::handler::{BoxedHandler, Call, HandlerResult, Reply, ReplyBody};
use crate::dispatch::negotiate::{encode, negotiate};
use crate::error::{ErrorEntry, HandlerError, LogLevel};
use crate::execution::{PoolError, PoolHandle};
use crate::health::HealthMonitor;
use crate::observability::{logging, metrics};
use crate::routing::router::{Route, RouteRegistry};
use crate::security::access::authorize;
use crate::security::auth::Authenticator;

/// Where a request is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolving,
    Authorizing,
    Binding,
    Invoking,
    Serializing,
    Done,
    Errored,
}

/// Decrements the in-flight counter however dispatch ends.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct Dispatcher {
    registry: Arc<RouteRegistry>,
    authenticator: Arc<dyn Authenticator>,
    pool: PoolHandle,
    monitor: Arc<HealthMonitor>,
    hits: AtomicU64,
    in_flight: AtomicUsize,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<RouteRegistry>,
        authenticator: Arc<dyn Authenticator>,
        pool: PoolHandle,
        monitor: Arc<HealthMonitor>,
    ) -> Self {
        Self {
            registry,
            authenticator,
            pool,
            monitor,
            hits: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<RouteRegistry> {
        &self.registry
    }

    pub fn pool(&self) -> &PoolHandle {
        &self.pool
    }

    /// Requests received since start.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Requests currently between receipt and response.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Run the whole pipeline. Always yields a response.
    pub async fn dispatch(&self, mut request: RequestContext) -> ResponseContext {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        let _guard = InFlight(&self.in_flight);

        let mut response = ResponseContext::new();
        let mut template = None;
        let (stage, mut response) = match self.prepare(&mut request, &mut response, &mut template) {
            Ok(prepared) => (Stage::Done, self.invoke(prepared, &request, response).await),
            Err(failed_at) => {
                tracing::debug!(
                    request_id = %request.request_id,
                    stage = ?failed_at,
                    status = response.status.as_u16(),
                    "Request rejected before invocation"
                );
                (Stage::Errored, response)
            }
        };

        if response.has_errors() && response.body.is_empty() {
            response.render_errors();
        }
        tracing::trace!(request_id = %request.request_id, stage = ?stage, "Dispatch finished");
        logging::log_completion(&request, template.as_deref(), &response);
        metrics::record_request(
            request.method.as_str(),
            response.status.as_u16(),
            response.received_at().elapsed(),
        );
        response
    }

    /// Resolving, Authorizing and Binding. On failure the response already
    /// carries the errors and the stage that produced them is returned.
    fn prepare(
        &self,
        request: &mut RequestContext,
        response: &mut ResponseContext,
        template: &mut Option<String>,
    ) -> Result<(Arc<Route>, Call), Stage> {
        let Some(resolved) = self.registry.resolve(&request.method, &request.path) else {
            response.fail(
                StatusCode::NOT_FOUND,
                vec![ErrorEntry::new(
                    StatusCode::NOT_FOUND,
                    format!("no route for {} {}", request.method, request.path),
                )],
                LogLevel::Info,
            );
            return Err(Stage::Resolving);
        };
        let route = resolved.route;
        *template = Some(route.meta.template.clone());
        request.apply_match(resolved.params);
        response.mark("resolved");

        request.caller = self.authenticator.authenticate(&request.headers);
        if let Err(entry) = authorize(&route.meta.access, request.caller.as_ref()) {
            let level = if entry.status() == StatusCode::FORBIDDEN {
                LogLevel::Warn
            } else {
                LogLevel::Info
            };
            response.fail(entry.status(), vec![entry], level);
            return Err(Stage::Authorizing);
        }
        response.mark("authorized");

        if let Some(entry) = unsupported_media_type(&route, request) {
            response.fail(entry.status(), vec![entry], LogLevel::Info);
            return Err(Stage::Binding);
        }
        let args = ParameterBinder::bind(&route, request, response);
        if response.has_errors() {
            return Err(Stage::Binding);
        }
        response.mark("bound");

        let call = Call {
            request: request.clone(),
            args,
        };
        Ok((route, call))
    }

    /// Invoking and Serializing, on the pool.
    async fn invoke(&self, (route, call): (Arc<Route>, Call), request: &RequestContext, response: ResponseContext) -> ResponseContext {
        let received = response.received_at();
        let invocation = Invocation {
            handler: route.meta.handler.clone(),
            produces: route.meta.produces.clone(),
            accept: request.headers.get(ACCEPT).and_then(|v| v.to_str().ok()).map(str::to_string),
            monitor: Arc::clone(&self.monitor),
            response,
        };

        let (tx, rx) = oneshot::channel();
        let submitted = self.pool.submit(async move {
            let response = invocation.run(call).await;
            let _ = tx.send(response);
        });

        if let Err(e) = submitted {
            let mut response = ResponseContext::starting_at(received);
            match e {
                PoolError::Rejected(state) => {
                    tracing::warn!(
                        request_id = %request.request_id,
                        active = state.active_count,
                        queued = state.queued_count,
                        queue_capacity = state.queue_capacity,
                        core = state.core_size,
                        max = state.max_size,
                        largest = state.largest_size,
                        submitted = state.submitted,
                        completed = state.completed,
                        "Execution pool rejected request"
                    );
                    metrics::record_pool_rejection(&state);
                    response.fail(
                        StatusCode::SERVICE_UNAVAILABLE,
                        vec![ErrorEntry::new(StatusCode::SERVICE_UNAVAILABLE, "server is busy, retry later")],
                        LogLevel::Warn,
                    );
                }
                other => {
                    tracing::warn!(request_id = %request.request_id, error = %other, "Execution pool unavailable");
                    response.fail(
                        StatusCode::SERVICE_UNAVAILABLE,
                        vec![ErrorEntry::new(StatusCode::SERVICE_UNAVAILABLE, "server is shutting down")],
                        LogLevel::Warn,
                    );
                }
            }
            return response;
        }
        metrics::record_pool_state(&self.pool.state());

        match rx.await {
            Ok(response) => response,
            Err(_) => {
                tracing::error!(request_id = %request.request_id, alert = true, "Worker dropped the request without replying");
                let mut response = ResponseContext::starting_at(received);
                response.fail(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    vec![ErrorEntry::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")],
                    LogLevel::Fatal,
                );
                response
            }
        }
    }
}

/// Everything the worker needs, moved onto the pool in one piece.
struct Invocation {
    handler: BoxedHandler,
    produces: Vec<String>,
    accept: Option<String>,
    monitor: Arc<HealthMonitor>,
    response: ResponseContext,
}

impl Invocation {
    async fn run(self, call: Call) -> ResponseContext {
        let Invocation {
            handler,
            produces,
            accept,
            monitor,
            mut response,
        } = self;
        let request_id = call.request.request_id.clone();

        tracing::trace!(request_id = %request_id, stage = ?Stage::Invoking, "Invoking handler");
        response.mark("business_logic_begin");
        let outcome: Result<HandlerResult, Box<dyn Any + Send>> =
            AssertUnwindSafe(async move { handler.call(call).await }).catch_unwind().await;
        response.mark("business_logic_end");

        tracing::trace!(request_id = %request_id, stage = ?Stage::Serializing, "Handler returned");
        match outcome {
            Ok(Ok(reply)) => apply_reply(reply, &produces, accept.as_deref(), &mut response),
            Ok(Err(err)) => {
                let class = err.classify();
                if class.probe_health {
                    monitor.trigger();
                }
                match class.level {
                    LogLevel::Fatal => tracing::error!(request_id = %request_id, alert = true, error = ?err, "Handler failed"),
                    LogLevel::Error => tracing::error!(request_id = %request_id, error = %err, "Handler failed"),
                    LogLevel::Warn => tracing::warn!(request_id = %request_id, error = %err, "Handler failed"),
                    _ => tracing::debug!(request_id = %request_id, error = %err, "Handler rejected request"),
                }
                response.fail(class.status, err.entries(), class.level);
            }
            Err(panic) => {
                tracing::error!(request_id = %request_id, alert = true, panic = panic_message(panic.as_ref()), "Handler panicked");
                response.fail(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    HandlerError::other("panic").entries(),
                    LogLevel::Fatal,
                );
            }
        }
        response.mark("serialized");
        response
    }
}

/// Serializing: status, headers, negotiated content type, body.
fn apply_reply(reply: Reply, produces: &[String], accept: Option<&str>, response: &mut ResponseContext) {
    let Reply {
        status,
        content_type,
        headers,
        body,
    } = reply;

    response.status = status.unwrap_or(match body {
        ReplyBody::Empty => StatusCode::NO_CONTENT,
        _ => StatusCode::OK,
    });
    response.headers.extend(headers);

    let explicit = content_type.is_some();
    let media_type = content_type.unwrap_or_else(|| negotiate(produces, accept));
    match encode(&body, &media_type) {
        Ok(Some(bytes)) => {
            response.body = Bytes::from(bytes);
            response.content_type = Some(media_type);
        }
        Ok(None) => {
            if explicit {
                response.content_type = Some(media_type);
            }
        }
        Err(e) => {
            tracing::error!(error = %e, media_type = %media_type, "Failed to serialise handler reply");
            response.fail(
                StatusCode::INTERNAL_SERVER_ERROR,
                vec![ErrorEntry::new(StatusCode::INTERNAL_SERVER_ERROR, "response serialisation failed")],
                LogLevel::Error,
            );
        }
    }
}

/// 415 when the route declares consumed types and the request body's type
/// matches none of them.
fn unsupported_media_type(route: &Route, request: &RequestContext) -> Option<ErrorEntry> {
    let consumes = &route.meta.consumes;
    if consumes.is_empty() || request.body.is_empty() {
        return None;
    }
    let content_type = request.content_type().unwrap_or_default().to_ascii_lowercase();
    let accepted = consumes
        .iter()
        .any(|declared| !content_type.is_empty() && content_type.contains(&declared.to_ascii_lowercase()));
    if accepted {
        None
    } else {
        Some(ErrorEntry::new(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            format!("content type `{}` not accepted, expected one of [{}]", content_type, consumes.join(", ")),
        ))
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
