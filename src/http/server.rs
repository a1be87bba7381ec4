//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router: `/ping` plus a fallback into the dispatcher
//! - Wire up middleware (request ID, tracing, timeout)
//! - Buffer request bodies up to the configured limit
//! - Convert between axum requests/responses and the dispatch contexts
//! - Bind server to listener and stop on the shutdown signal

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::dispatch::negotiate::APPLICATION_JSON;
use crate::dispatch::{Dispatcher, RequestContext, ResponseContext};
use crate::error::ErrorEntry;
use crate::health::{HealthMonitor, ServerStatus};
use crate::lifecycle::Shutdown;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub status: Arc<ServerStatus>,
    pub monitor: Arc<HealthMonitor>,
    pub max_body_bytes: usize,
}

/// HTTP front end for the dispatcher.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(state: AppState, request_timeout: Duration) -> Self {
        Self {
            router: Self::build_router(state, request_timeout),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: AppState, request_timeout: Duration) -> Router {
        Router::new()
            .route("/ping", get(ping_handler))
            .fallback(dispatch_handler)
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(TimeoutLayer::new(request_timeout))
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Load-balancer health check. Outside the authorization pipeline.
async fn ping_handler(State(state): State<AppState>) -> impl IntoResponse {
    if state.status.is_paused() {
        (StatusCode::SERVICE_UNAVAILABLE, "paused")
    } else if !state.monitor.is_healthy() {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    } else {
        (StatusCode::OK, "pong")
    }
}

/// Everything that is not `/ping` goes through the dispatcher.
async fn dispatch_handler(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    let request_id = parts
        .headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let bytes = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Request body rejected");
            return error_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                format!("request body exceeds {} bytes", state.max_body_bytes),
            );
        }
    };

    let target = parts.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let context = RequestContext::new(parts.method, target, parts.headers, bytes).with_request_id(request_id);

    into_response(state.dispatcher.dispatch(context).await)
}

fn into_response(context: ResponseContext) -> Response {
    let mut response = Response::new(Body::from(context.body));
    *response.status_mut() = context.status;
    let headers = response.headers_mut();
    headers.extend(context.headers);
    if let Some(content_type) = context.content_type {
        match HeaderValue::from_str(&content_type) {
            Ok(value) => {
                headers.insert(header::CONTENT_TYPE, value);
            }
            Err(_) => tracing::warn!(content_type = %content_type, "Dropping invalid content type"),
        }
    }
    response
}

fn error_response(status: StatusCode, message: String) -> Response {
    let body = serde_json::to_vec(&[ErrorEntry::new(status, message)]).unwrap_or_default();
    (status, [(header::CONTENT_TYPE, APPLICATION_JSON)], body).into_response()
}
