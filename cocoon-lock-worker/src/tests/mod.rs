// Copyright (c) 2023 The Cocoon Authors

use crate::{start_lock_worker, ConsulLockController, MemoryLockController};
use axum::{routing::put, Json, Router};
use cocoon_consul::ConsulClient;
use cocoon_lock_exports::{Lock, LockConfig, LockController, LockError};
use serde_json::json;
use std::time::Duration;

const TTL: Duration = Duration::from_secs(10);

#[tokio::test(start_paused = true)]
async fn lease_expires_after_ttl() {
    let backend = MemoryLockController::new();
    let mut a = Lock::new(backend.clone_box(), "c1", "k", TTL).unwrap();
    let mut b = Lock::new(backend.clone_box(), "c1", "k", TTL).unwrap();

    a.acquire().await.unwrap();
    assert_eq!(b.acquire().await, Err(LockError::LockAlreadyAcquired));
    a.is_acquirer().await.unwrap();

    tokio::time::advance(Duration::from_secs(11)).await;

    b.acquire().await.unwrap();
    assert_eq!(a.is_acquirer().await, Err(LockError::LockNotAcquired));
    b.is_acquirer().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn holder_can_renew() {
    let backend = MemoryLockController::new();
    let session = backend.acquire("k", TTL, "").await.unwrap();
    tokio::time::advance(Duration::from_secs(8)).await;
    assert_eq!(backend.acquire("k", TTL, &session).await.unwrap(), session);
    tokio::time::advance(Duration::from_secs(8)).await;
    backend.is_acquirer("k", &session).await.unwrap();
    assert_eq!(backend.remove_expired(), 0);
    tokio::time::advance(Duration::from_secs(3)).await;
    assert_eq!(backend.remove_expired(), 1);
}

#[tokio::test]
async fn release_is_idempotent() {
    let backend = MemoryLockController::new();
    let mut a = Lock::new(backend.clone_box(), "c1", "k", TTL).unwrap();
    a.release().await.unwrap();
    a.acquire().await.unwrap();

    // someone else's release does not free the key
    backend.release(a.key(), "other").await.unwrap();
    a.is_acquirer().await.unwrap();

    a.release().await.unwrap();
    a.release().await.unwrap();
    assert_eq!(a.is_acquirer().await, Err(LockError::LockNotAcquired));

    let mut b = Lock::new(backend.clone_box(), "c1", "k", TTL).unwrap();
    b.acquire().await.unwrap();
}

#[tokio::test]
async fn keys_are_scoped_by_cocoon() {
    let backend = MemoryLockController::new();
    let mut a = Lock::new(backend.clone_box(), "c1", "k", TTL).unwrap();
    let mut b = Lock::new(backend.clone_box(), "c2", "k", TTL).unwrap();
    a.acquire().await.unwrap();
    b.acquire().await.unwrap();
    assert_eq!(a.key(), "platform/lock/c1.k");
}

#[tokio::test]
async fn worker_starts_and_stops() {
    let (mut manager, controller) = start_lock_worker(LockConfig {
        watcher_interval: Duration::from_millis(10),
        ..Default::default()
    })
    .unwrap();
    let session = controller.acquire("k", TTL, "").await.unwrap();
    controller.is_acquirer("k", &session).await.unwrap();
    manager.stop();
}

#[tokio::test]
async fn consul_lock_held_elsewhere() {
    let app = Router::new()
        .route(
            "/v1/session/create",
            put(|| async { Json(json!({"ID": "s1"})) }),
        )
        .route("/v1/kv/*key", put(|| async { "false" }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await });

    let client = ConsulClient::new(&addr.to_string(), Duration::from_secs(5)).unwrap();
    let backend = ConsulLockController::new(client);
    assert_eq!(
        backend.acquire("platform/lock/c1.k", TTL, "").await,
        Err(LockError::LockAlreadyAcquired)
    );
}
