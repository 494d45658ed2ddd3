// Copyright (c) 2023 The Cocoon Authors


use crate::{
    http_router, ConnectorConfig, ConnectorError, Connector, ConnectorParts, ConnectorProxy,
    LifecycleEvent, SourceFetcher, EXIT_BUILD_FAILED, EXIT_FAILED, EXIT_INVALID_SPEC, EXIT_OK,
};
use assert_matches::assert_matches;
use cocoon_lock_worker::MemoryLockController;
use cocoon_models::acl::AclMap;
use cocoon_models::cocoon::{CocoonStatus, ResourceUsage};
use cocoon_models::naming::SYSTEM_COCOON_ID;
use cocoon_models::CocoonError;
use cocoon_platform::Platform;
use cocoon_proto::connector::connector_server::Connector as _;
use cocoon_proto::connector::{
    CreateLedgerRequest, GetRequest, InvokeRequest, LockRequest, PutRequest,
};
use cocoon_proto::types as grpc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tonic::Request;
use tools::*;

fn proxy(platform: &Platform, cocoon_id: &str, link: &str) -> ConnectorProxy {
    ConnectorProxy::new(
        cocoon_id,
        link,
        platform.clone(),
        Box::new(MemoryLockController::new()),
        Box::new(FakeCode::default()),
    )
}

fn put_request(link_to: &str, ledger: &str, key: &str) -> Request<PutRequest> {
    Request::new(PutRequest {
        link_to: link_to.into(),
        ledger: ledger.into(),
        transactions: vec![grpc::Transaction {
            id: format!("tx-{}", key),
            key: key.into(),
            value: "v".into(),
            ..Default::default()
        }],
    })
}

fn create_request(link_to: &str, name: &str, public: bool) -> Request<CreateLedgerRequest> {
    Request::new(CreateLedgerRequest {
        link_to: link_to.into(),
        name: name.into(),
        chained: false,
        public,
    })
}

fn lock_request(link_to: &str, key: &str, session: &str) -> Request<LockRequest> {
    Request::new(LockRequest {
        link_to: link_to.into(),
        key: key.into(),
        ttl: 30,
        session: session.into(),
    })
}

fn denied<T: std::fmt::Debug>(res: Result<T, tonic::Status>) -> CocoonError {
    CocoonError::from(res.unwrap_err())
}

#[tokio::test]
async fn cocoon_uses_its_own_ledgers() {
    let (platform, _dir) = new_platform();
    let c1 = proxy(&platform, "c1", "");
    c1.create_ledger(create_request("", "accounts", false)).await.unwrap();
    c1.put(put_request("", "accounts", "alice")).await.unwrap();
    let tx = c1
        .get(Request::new(GetRequest {
            link_to: "c1".into(),
            ledger: "accounts".into(),
            key: "alice".into(),
        }))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(tx.value, "v");

    let empty = c1
        .put(Request::new(PutRequest {
            link_to: String::new(),
            ledger: "accounts".into(),
            transactions: vec![],
        }))
        .await;
    assert_matches!(denied(empty), CocoonError::InvalidArgument(_));
}

#[tokio::test]
async fn unlinked_cocoons_are_isolated() {
    let (platform, _dir) = new_platform();
    let c1 = proxy(&platform, "c1", "");
    c1.create_ledger(create_request("", "accounts", true)).await.unwrap();

    let c3 = proxy(&platform, "c3", "");
    let res = c3
        .get(Request::new(GetRequest {
            link_to: "c1".into(),
            ledger: "accounts".into(),
            key: "alice".into(),
        }))
        .await;
    assert_matches!(denied(res), CocoonError::PermissionDenied(msg) if msg.contains("not natively linked"));
}

#[tokio::test]
async fn linked_cocoon_follows_acl_of_its_target() {
    let (platform, _dir) = new_platform();
    let mut target = cocoon("c1", "");
    let mut acl = AclMap::new();
    acl.add("shared.c2", "allow-put").unwrap();
    acl.add("frozen", "deny-put").unwrap();
    target.acl = acl;
    platform.put_cocoon(&target).await.unwrap();

    let c1 = proxy(&platform, "c1", "");
    c1.create_ledger(create_request("", "shared", false)).await.unwrap();
    c1.create_ledger(create_request("", "frozen", true)).await.unwrap();
    c1.create_ledger(create_request("", "closed", false)).await.unwrap();

    let c2 = proxy(&platform, "c2", "c1");
    c2.put(put_request("c1", "shared", "k1")).await.unwrap();
    assert_matches!(
        denied(c2.put(put_request("c1", "frozen", "k1")).await),
        CocoonError::PermissionDenied(msg) if msg == "PUT operation not allowed"
    );
    // private ledger without a rule for the actor
    assert_matches!(
        denied(c2.put(put_request("c1", "closed", "k1")).await),
        CocoonError::PermissionDenied(_)
    );
    // new ledgers of the target are private until allowed
    assert_matches!(
        denied(c2.create_ledger(create_request("c1", "fresh", true)).await),
        CocoonError::PermissionDenied(_)
    );
}

#[tokio::test]
async fn system_ledgers_are_read_only() {
    let (platform, _dir) = new_platform();
    platform.put_cocoon(&cocoon("c9", "")).await.unwrap();
    let c1 = proxy(&platform, "c1", "");
    assert_matches!(
        denied(c1.put(put_request(SYSTEM_COCOON_ID, "public", "k")).await),
        CocoonError::PermissionDenied(_)
    );
    assert_matches!(
        denied(c1.create_ledger(create_request(SYSTEM_COCOON_ID, "mine", true)).await),
        CocoonError::PermissionDenied(_)
    );
    let ledger = c1
        .get_ledger(Request::new(cocoon_proto::connector::GetLedgerRequest {
            link_to: SYSTEM_COCOON_ID.into(),
            name: "public".into(),
        }))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(ledger.name, "public");
}

#[tokio::test]
async fn locks_are_scoped_to_linked_cocoons() {
    let (platform, _dir) = new_platform();
    let c1 = proxy(&platform, "c1", "");
    let session = c1
        .acquire_lock(lock_request("", "job", ""))
        .await
        .unwrap()
        .into_inner()
        .session;
    assert!(!session.is_empty());
    c1.is_lock_acquirer(lock_request("", "job", &session)).await.unwrap();
    c1.release_lock(lock_request("", "job", &session)).await.unwrap();

    assert_matches!(
        denied(c1.acquire_lock(lock_request(SYSTEM_COCOON_ID, "_reserved", "")).await),
        CocoonError::PermissionDenied(_)
    );
    assert_matches!(
        denied(c1.acquire_lock(lock_request("c7", "job", "")).await),
        CocoonError::PermissionDenied(_)
    );
    assert_matches!(
        denied(c1.acquire_lock(lock_request("", "  ", "")).await),
        CocoonError::InvalidArgument(_)
    );
    let mut short = lock_request("", "job", "");
    short.get_mut().ttl = 1;
    assert_matches!(denied(c1.acquire_lock(short).await), CocoonError::InvalidArgument(_));
}

#[tokio::test]
async fn invoke_reaches_cocoon_code() {
    let (platform, _dir) = new_platform();
    let c1 = proxy(&platform, "c1", "");
    let resp = c1
        .invoke(Request::new(InvokeRequest {
            id: "i1".into(),
            function: "ping".into(),
            ..Default::default()
        }))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(resp.id, "i1");
    assert_eq!(resp.body, b"ping".to_vec());
}

async fn serve_router(app: axum::Router) -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn http_invoke_validates_structured_bodies() {
    let addr = serve_router(http_router("c1", Box::new(FakeCode::default()))).await;
    let client = reqwest::Client::new();
    let url = format!("http://{}/v1/invoke", addr);

    let resp = client
        .post(&url)
        .json(&serde_json::json!({"function": "add", "params": ["1"]}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["body"], "add");
    assert!(uuid::Uuid::parse_str(body["id"].as_str().unwrap()).is_ok());

    let resp = client
        .post(&url)
        .json(&serde_json::json!({"id": "xyz", "function": "add"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "2");

    let resp = client
        .post(&url)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "1");

    let health: serde_json::Value = client
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["cocoonId"], "c1");
}

fn connector_config(cocoon_id: &str, release_id: &str) -> ConnectorConfig {
    ConnectorConfig {
        cocoon_id: cocoon_id.into(),
        release_id: release_id.into(),
        container_name: format!("cocoon-{}", cocoon_id),
        ..Default::default()
    }
}

fn parts(platform: &Platform, runtime: &FakeRuntime, code: &FakeCode) -> ConnectorParts {
    ConnectorParts {
        platform: platform.clone(),
        runtime: Box::new(runtime.clone()),
        code: Box::new(code.clone()),
        fetcher: SourceFetcher::new(reqwest::Client::new()),
        router: None,
    }
}

async fn deploy(platform: &Platform) {
    let c = cocoon("c1", "");
    platform.put_cocoon(&c).await.unwrap();
    platform.put_release(&release("r1", &c)).await.unwrap();
}

#[tokio::test]
async fn cocoon_code_runs_then_stops_cleanly() {
    let (platform, _dir) = new_platform();
    deploy(&platform).await;
    let runtime = FakeRuntime::default();
    *runtime.stats.lock() = crate::ContainerStats {
        disk_usage: 10,
        net_rx: 100,
        net_tx: 50,
    };
    let code = FakeCode::default();

    let connector = Connector::resolve(connector_config("c1", "r1"), parts(&platform, &runtime, &code))
        .await
        .unwrap();
    assert_eq!(connector.run_env().get("COCOON_ID"), Some("c1"));
    assert_eq!(connector.run().await, EXIT_OK);

    assert_eq!(runtime.labels(), vec!["FETCH", "BUILD", "CONFIG-FIREWALL", "RUN"]);
    assert!(runtime.execs.lock()[0].1, "fetch runs privileged");
    assert!(code.stopped.load(Ordering::SeqCst));

    let stored = platform.get_cocoon("c1").await.unwrap();
    assert_eq!(stored.status, CocoonStatus::Stopped);
    assert_eq!(
        stored.resource_usage,
        ResourceUsage {
            net_in: 100,
            net_out: 50
        }
    );
}

#[tokio::test]
async fn failed_build_stops_with_build_exit_code() {
    let (platform, _dir) = new_platform();
    deploy(&platform).await;
    let runtime = FakeRuntime::default().with_code("BUILD", 2);
    let connector = Connector::resolve(
        connector_config("c1", "r1"),
        parts(&platform, &runtime, &FakeCode::default()),
    )
    .await
    .unwrap();
    assert_eq!(connector.run().await, EXIT_BUILD_FAILED);
    assert_eq!(runtime.labels(), vec!["FETCH", "BUILD"]);
    assert_eq!(
        platform.get_cocoon("c1").await.unwrap().status,
        CocoonStatus::Stopped
    );
}

#[tokio::test]
async fn crashed_cocoon_code_is_a_failure() {
    let (platform, _dir) = new_platform();
    deploy(&platform).await;
    let runtime = FakeRuntime::default().with_code("RUN", 137);
    let connector = Connector::resolve(
        connector_config("c1", "r1"),
        parts(&platform, &runtime, &FakeCode::default()),
    )
    .await
    .unwrap();
    assert_eq!(connector.run().await, EXIT_FAILED);
}

#[tokio::test]
async fn unknown_release_is_an_invalid_spec() {
    let (platform, _dir) = new_platform();
    deploy(&platform).await;
    let res = Connector::resolve(
        connector_config("c1", "r404"),
        parts(&platform, &FakeRuntime::default(), &FakeCode::default()),
    )
    .await;
    let err = res.err().unwrap();
    assert_eq!(err.exit_code(), EXIT_INVALID_SPEC);

    let c2 = cocoon("c2", "");
    platform.put_cocoon(&c2).await.unwrap();
    let res = Connector::resolve(
        connector_config("c2", "r1"),
        parts(&platform, &FakeRuntime::default(), &FakeCode::default()),
    )
    .await;
    assert_matches!(res.err(), Some(ConnectorError::SpecError(_)));
}

#[tokio::test]
async fn dev_cocoon_code_is_only_health_checked() {
    let (platform, _dir) = new_platform();
    deploy(&platform).await;
    let runtime = FakeRuntime::default();
    let mut config = connector_config("c1", "r1");
    config.dev_cocoon_code_addr = Some("127.0.0.1:8000".into());
    let connector = Connector::resolve(config, parts(&platform, &runtime, &FakeCode::default()))
        .await
        .unwrap();
    connector
        .event_sender()
        .send(LifecycleEvent::Stop { failed: false })
        .unwrap();
    assert_eq!(connector.run().await, EXIT_OK);
    assert!(runtime.labels().is_empty());
}

#[tokio::test]
async fn disk_overuse_restarts_container() {
    let (platform, _dir) = new_platform();
    deploy(&platform).await;
    let runtime = FakeRuntime::default();
    *runtime.stats.lock() = crate::ContainerStats {
        disk_usage: 5000,
        net_rx: 0,
        net_tx: 0,
    };
    let mut config = connector_config("c1", "r1");
    config.disk_limit = Some(1000);
    config.monitor_interval = Duration::from_millis(100);
    let mut connector = Connector::resolve(config, parts(&platform, &runtime, &FakeCode::default()))
        .await
        .unwrap();
    connector.launch().await.unwrap();
    connector.restart().await.unwrap();
    assert!(runtime.removed.load(Ordering::SeqCst));
    assert_eq!(
        runtime.labels().iter().filter(|l| l.as_str() == "FETCH").count(),
        2
    );
    assert_eq!(connector.stop(EXIT_OK).await, EXIT_OK);
}
