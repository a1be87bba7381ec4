//! Bounded execution pool behaviour as seen through the dispatcher.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{Method, StatusCode};
use tokio::sync::Semaphore;

use switchyard::dispatch::{Call, Reply};
use switchyard::error::{HandlerError, LogLevel};
use switchyard::execution::PoolState;
use switchyard::routing::RouteMeta;

mod common;

use common::{assert_status, error_entries, get, harness_with_pool, pool, text_body};

fn gated_route(gate: Arc<Semaphore>) -> RouteMeta {
    RouteMeta::new(Method::GET, "/work", move |_call: Call| {
        let gate = Arc::clone(&gate);
        async move {
            let _permit = gate.acquire().await;
            Ok::<_, HandlerError>(Reply::raw("done"))
        }
    })
    .permit_all()
}

async fn wait_for(state: impl Fn() -> PoolState, ready: impl Fn(&PoolState) -> bool) {
    for _ in 0..400 {
        if ready(&state()) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("pool never reached the expected state: {}", state());
}

#[tokio::test]
async fn test_third_request_is_shed_with_503() {
    let gate = Arc::new(Semaphore::new(0));
    let h = harness_with_pool(vec![gated_route(gate.clone())], pool(1, 1, 1));
    let pool = h.dispatcher.pool().clone();

    let first = tokio::spawn({
        let dispatcher = Arc::clone(&h.dispatcher);
        async move { dispatcher.dispatch(get("/work")).await }
    });
    wait_for(|| pool.state(), |s| s.active_count == 1).await;

    let second = tokio::spawn({
        let dispatcher = Arc::clone(&h.dispatcher);
        async move { dispatcher.dispatch(get("/work")).await }
    });
    wait_for(|| pool.state(), |s| s.queued_count == 1).await;

    let third = h.dispatcher.dispatch(get("/work")).await;
    assert_status(&third, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(third.log_level, LogLevel::Warn);
    assert_eq!(error_entries(&third)[0].message, "server is busy, retry later");

    let state = pool.state();
    assert_eq!(state.active_count, 1);
    assert_eq!(state.queued_count, 1);
    assert_eq!(state.worker_count, 1);

    gate.add_permits(2);
    let first = first.await.unwrap();
    let second = second.await.unwrap();
    assert_status(&first, StatusCode::OK);
    assert_status(&second, StatusCode::OK);
    assert_eq!(text_body(&second), "done");
}

#[tokio::test]
async fn test_pool_grows_before_shedding() {
    let gate = Arc::new(Semaphore::new(0));
    let h = harness_with_pool(vec![gated_route(gate.clone())], pool(1, 2, 1));
    let pool = h.dispatcher.pool().clone();

    let spawn = || {
        let dispatcher = Arc::clone(&h.dispatcher);
        tokio::spawn(async move { dispatcher.dispatch(get("/work")).await })
    };

    // Core worker busy, then the queue fills, then a second worker starts.
    let first = spawn();
    wait_for(|| pool.state(), |s| s.active_count == 1).await;
    let second = spawn();
    wait_for(|| pool.state(), |s| s.queued_count == 1).await;
    let third = spawn();
    wait_for(|| pool.state(), |s| s.active_count == 2 && s.queued_count == 1).await;
    assert_eq!(pool.state().worker_count, 2);
    assert_eq!(pool.state().largest_size, 2);

    let shed = h.dispatcher.dispatch(get("/work")).await;
    assert_status(&shed, StatusCode::SERVICE_UNAVAILABLE);

    gate.add_permits(3);
    for handle in [first, second, third] {
        assert_status(&handle.await.unwrap(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_shut_down_pool_answers_503() {
    let gate = Arc::new(Semaphore::new(0));
    let h = harness_with_pool(vec![gated_route(gate)], pool(1, 1, 4));
    h.dispatcher.pool().shutdown().await;

    let response = h.dispatcher.dispatch(get("/work")).await;
    assert_status(&response, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(error_entries(&response)[0].message, "server is shutting down");
}
