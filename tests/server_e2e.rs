//! Full server over real sockets, driven with reqwest.

use std::sync::Arc;

use axum::http::Method;
use reqwest::StatusCode;
use serde_json::Value;

use switchyard::dispatch::{Call, Reply};
use switchyard::error::HandlerError;
use switchyard::routing::{ParamSpec, RouteMeta, TargetType};

mod common;

use common::{spawn_server, test_config, CountingInspector};

const TOKEN_HEADER: &str = "x-authtoken";

fn greeting_route() -> RouteMeta {
    RouteMeta::new(Method::GET, "/greet/{name}", |call: Call| async move {
        let name = call.args.text(0).unwrap_or_default().to_string();
        let times = call.args.int(1).unwrap_or(1);
        Ok::<_, HandlerError>(Reply::value(serde_json::json!({ "greeting": format!("hello {name}"), "times": times })))
    })
    .permit_all()
    .param(ParamSpec::path("name"))
    .param(ParamSpec::query("times").target(TargetType::Integer).default_value("1"))
}

async fn login(client: &reqwest::Client, base: &str) -> String {
    let res = client
        .post(format!("{base}/j_security_check"))
        .form(&[("j_username", "ops"), ("j_password", "secret")])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    res.headers()
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_user_route_and_request_id() {
    let server = spawn_server(test_config(), vec![greeting_route()], Arc::new(CountingInspector::default())).await;
    let client = reqwest::Client::new();

    let res = client.get(server.url("/greet/ada?times=3")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));
    assert_eq!(res.headers()["content-type"], "application/json");
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, serde_json::json!({ "greeting": "hello ada", "times": 3 }));

    let res = client.get(server.url("/nowhere")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body[0]["code"], 404);

    server.stop().await;
}

#[tokio::test]
async fn test_admin_session_flow() {
    let server = spawn_server(test_config(), Vec::new(), Arc::new(CountingInspector::default())).await;
    let client = reqwest::Client::new();
    let base = format!("http://{}", server.addr);

    let res = client.get(server.url("/version")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .post(server.url("/j_security_check"))
        .form(&[("j_username", "ops"), ("j_password", "wrong")])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let token = login(&client, &base).await;

    let res = client
        .get(server.url("/version"))
        .header(TOKEN_HEADER, &token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), env!("CARGO_PKG_VERSION"));

    let res = client
        .get(server.url("/inspection"))
        .header(TOKEN_HEADER, &token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "inspection passed");
    assert_eq!(body["errors"], serde_json::json!([]));

    let res = client
        .delete(server.url("/logout"))
        .header(TOKEN_HEADER, &token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = client
        .get(server.url("/version"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    server.stop().await;
}

#[tokio::test]
async fn test_pause_flips_ping() {
    let server = spawn_server(test_config(), Vec::new(), Arc::new(CountingInspector::default())).await;
    let client = reqwest::Client::new();
    let token = login(&client, &format!("http://{}", server.addr)).await;

    let res = client.get(server.url("/ping")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .put(server.url("/status?pause=true"))
        .header(TOKEN_HEADER, &token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = client.get(server.url("/ping")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);

    let res = client
        .put(server.url("/status?pause=maybe"))
        .header(TOKEN_HEADER, &token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    client
        .put(server.url("/status?pause=false"))
        .header(TOKEN_HEADER, &token)
        .send()
        .await
        .unwrap();
    let res = client.get(server.url("/ping")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    server.stop().await;
}

#[tokio::test]
async fn test_loadtest_echo_and_body_limit() {
    let mut config = test_config();
    config.listener.max_body_bytes = 64;
    let server = spawn_server(config, Vec::new(), Arc::new(CountingInspector::default())).await;
    let client = reqwest::Client::new();

    let res = client
        .get(server.url("/loadtest/echo/hello?delay_ms=10"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "hello");

    let res = client.get(server.url("/loadtest/echo/caf%C3%A9%20au%20lait")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "café au lait");

    let res = client
        .post(server.url("/loadtest/echo"))
        .body("ping-pong")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "ping-pong");

    let res = client
        .post(server.url("/loadtest/echo"))
        .body("x".repeat(1024))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);

    server.stop().await;
}

#[tokio::test]
async fn test_shutdown_stops_listener() {
    let server = spawn_server(test_config(), Vec::new(), Arc::new(CountingInspector::default())).await;
    let addr = server.addr;
    server.stop().await;

    let res = reqwest::Client::new().get(format!("http://{addr}/ping")).send().await;
    assert!(res.is_err());
}
