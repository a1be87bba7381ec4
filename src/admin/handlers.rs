use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use serde::Serialize;

use crate::dispatch::handler::{Call, HandlerResult, Reply};
use crate::dispatch::negotiate::{APPLICATION_JSON, TEXT_PLAIN};
use crate::error::{ErrorEntry, HandlerError};
use crate::health::{HealthInspector, ServerStatus};
use crate::routing::meta::{ParamSpec, RouteMeta, TargetType};
use crate::security::auth::Authenticator;

/// Collaborators the admin routes act on.
#[derive(Clone)]
pub struct AdminDeps {
    pub authenticator: Arc<dyn Authenticator>,
    pub inspector: Arc<dyn HealthInspector>,
    pub status: Arc<ServerStatus>,
}

#[derive(Debug, Serialize)]
pub struct InspectionReport {
    pub message: &'static str,
    pub errors: Vec<ErrorEntry>,
}

pub async fn version(_call: Call) -> HandlerResult {
    Ok(Reply::raw(env!("CARGO_PKG_VERSION")).content_type(TEXT_PLAIN))
}

pub async fn inspection(inspector: Arc<dyn HealthInspector>) -> HandlerResult {
    let errors = inspector.ping(true).await;
    if errors.is_empty() {
        return Ok(Reply::value(InspectionReport {
            message: "inspection passed",
            errors,
        }));
    }
    tracing::warn!(errors = errors.len(), "Inspection failed");
    Ok(Reply::value(InspectionReport {
        message: "inspection failed",
        errors,
    })
    .status(StatusCode::INTERNAL_SERVER_ERROR)
    .content_type(APPLICATION_JSON))
}

pub async fn set_status(status: Arc<ServerStatus>, call: Call) -> HandlerResult {
    let pause = call
        .args
        .boolean(0)
        .ok_or_else(|| HandlerError::client(StatusCode::BAD_REQUEST, "pause must be true or false"))?;
    status.set_paused(pause);
    Ok(Reply::empty())
}

pub async fn login(authenticator: Arc<dyn Authenticator>, call: Call) -> HandlerResult {
    let username = call.args.text(0).unwrap_or_default();
    let password = call.args.text(1).unwrap_or_default();

    let token = match authenticator.login(username, password) {
        Ok(token) => token,
        Err(e) => {
            tracing::info!(user = %username, error = %e, "Login rejected");
            return Err(HandlerError::client(StatusCode::UNAUTHORIZED, "invalid username or password"));
        }
    };

    let name = HeaderName::from_bytes(authenticator.token_header().as_bytes())
        .map_err(|e| HandlerError::other(format!("invalid token header name: {e}")))?;
    let value =
        HeaderValue::from_str(&token).map_err(|e| HandlerError::other(format!("invalid token value: {e}")))?;

    Ok(Reply::empty().status(StatusCode::CREATED).header(name, value))
}

pub async fn logout(authenticator: Arc<dyn Authenticator>, call: Call) -> HandlerResult {
    authenticator.logout(&call.request.headers);
    Ok(Reply::empty())
}

async fn pause_for(call: &Call) {
    let delay = call
        .args
        .index_of("delay_ms")
        .and_then(|i| call.args.int(i))
        .filter(|d| *d > 0);
    if let Some(delay) = delay {
        tokio::time::sleep(Duration::from_millis(delay as u64)).await;
    }
}

/// Sleep for the optional `delay_ms`, then echo the received path.
pub async fn echo_path(call: Call) -> HandlerResult {
    pause_for(&call).await;
    let path = call.args.text(0).unwrap_or_default().to_string();
    Ok(Reply::raw(path).content_type(TEXT_PLAIN))
}

/// Sleep for the optional `delay_ms`, then echo the received body.
pub async fn echo_body(call: Call) -> HandlerResult {
    pause_for(&call).await;
    Ok(Reply::raw(String::from_utf8_lossy(&call.request.body).into_owned()).content_type(TEXT_PLAIN))
}

/// Admin routes, gated by `role`. Login, logout and the loadtest echo are open.
pub fn admin_routes(role: &str, loadtest_enabled: bool, deps: AdminDeps) -> Vec<RouteMeta> {
    let AdminDeps {
        authenticator,
        inspector,
        status,
    } = deps;

    let mut routes = vec![
        RouteMeta::new(Method::GET, "/version", version)
            .roles([role])
            .produces(TEXT_PLAIN),
        RouteMeta::new(Method::GET, "/inspection", move |_call: Call| {
            inspection(Arc::clone(&inspector))
        })
        .roles([role])
        .produces(APPLICATION_JSON),
        RouteMeta::new(Method::PUT, "/status", move |call: Call| {
            set_status(Arc::clone(&status), call)
        })
        .roles([role])
        .param(ParamSpec::query("pause").target(TargetType::Boolean).required()),
    ];

    let login_auth = Arc::clone(&authenticator);
    routes.push(
        RouteMeta::new(Method::POST, "/j_security_check", move |call: Call| {
            login(Arc::clone(&login_auth), call)
        })
        .permit_all()
        .param(ParamSpec::form("j_username").required())
        .param(ParamSpec::form("j_password").required()),
    );
    routes.push(
        RouteMeta::new(Method::DELETE, "/logout", move |call: Call| {
            logout(Arc::clone(&authenticator), call)
        })
        .permit_all()
        .param(ParamSpec::request()),
    );

    if loadtest_enabled {
        routes.push(
            RouteMeta::new(Method::GET, "/loadtest/echo/{path}", echo_path)
                .permit_all()
                .param(ParamSpec::path("path"))
                .param(ParamSpec::query("delay_ms").target(TargetType::Integer)),
        );
        routes.push(
            RouteMeta::new(Method::POST, "/loadtest/echo", echo_body)
                .permit_all()
                .param(ParamSpec::query("delay_ms").target(TargetType::Integer)),
        );
    }

    routes
}
