// Copyright (c) 2023 The Cocoon Authors

mod tools;

use crate::{
    BlockMaker, CocoonCode, ConnectorCommitter, Invocation, Link, Runtime, RuntimeConfig,
    RuntimeError, DEFAULT_LEDGER, EXIT_INIT_FAILED,
};
use assert_matches::assert_matches;
use cocoon_models::CocoonError;
use cocoon_proto::stub::stub_client::StubClient;
use cocoon_proto::stub::InvokeParams;
use cocoon_proto::types::Void;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tools::LocalConnector;

fn link_to(connector: &LocalConnector, cocoon_id: &str, block_maker: &BlockMaker) -> Link {
    Link::new(
        cocoon_id,
        DEFAULT_LEDGER,
        true,
        Box::new(connector.clone()),
        block_maker.clone(),
    )
}

#[tokio::test(start_paused = true)]
async fn concurrent_puts_share_a_block() {
    let (connector, _dir) = LocalConnector::new();
    let block_maker = BlockMaker::new(100, Duration::from_secs(5));
    let handle = block_maker.start(Arc::new(ConnectorCommitter(Box::new(connector.clone()))));
    let link = link_to(&connector, "c1", &block_maker).with_default_ledger("lg");
    link.create_ledger("lg", true, true).await.unwrap();

    let (a, b, c) = tokio::join!(link.put("a", "1"), link.put("b", "2"), link.put("c", "3"));
    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
    let block = a.block.clone().unwrap();
    assert_eq!(block.number, 1);
    assert_eq!(b.block.unwrap().id, block.id);
    assert_eq!(c.block.unwrap().id, block.id);
    assert_eq!(a.ledger, "lg");

    let stored = link.get("b").await.unwrap();
    assert_eq!(stored.value, "2");
    assert_eq!(stored.block.unwrap().id, block.id);
    assert_eq!(link.get_block(&block.id).await.unwrap().hash, block.hash);
    assert_eq!(link.get_by_id(&a.id).await.unwrap().key, "a");

    let next = link.put("a", "4").await.unwrap().block.unwrap();
    assert_eq!(next.number, 2);
    assert_eq!(next.prev_block_hash, block.hash);
    handle.stop().await;
}

#[tokio::test]
async fn flat_ledgers_and_names() {
    let (connector, _dir) = LocalConnector::new();
    let block_maker = BlockMaker::new(100, Duration::from_secs(5));
    let link = link_to(&connector, "c1", &block_maker);

    assert_eq!(
        link.create_ledger("public", false, true).await.unwrap_err(),
        RuntimeError::ReservedName
    );
    assert_matches!(
        link.create_ledger("bad.name", false, true).await,
        Err(RuntimeError::Cocoon(CocoonError::InvalidResourceName(_)))
    );
    assert_matches!(
        link.put("k", "v").await,
        Err(RuntimeError::Cocoon(CocoonError::LedgerNotFound))
    );

    let ledger = link.create_ledger(DEFAULT_LEDGER, false, true).await.unwrap();
    assert!(!ledger.chained);
    let tx = link.put("k", "v").await.unwrap();
    assert!(tx.block.is_none());
    assert!(block_maker.is_empty());
    assert_eq!(link.get("k").await.unwrap().id, tx.id);
    assert_matches!(
        link.get("nope").await,
        Err(RuntimeError::Cocoon(CocoonError::TxNotFound))
    );
}

#[tokio::test]
async fn range_getter_walks_every_page() {
    let (connector, _dir) = LocalConnector::new();
    let block_maker = BlockMaker::new(100, Duration::from_secs(5));
    let link = link_to(&connector, "c1", &block_maker);
    link.create_ledger(DEFAULT_LEDGER, false, true).await.unwrap();
    for i in 0..120 {
        link.put(&format!("account.{:03}", i), "v").await.unwrap();
    }
    link.put("other", "v").await.unwrap();

    let mut getter = link.range_getter("account", "", false);
    let mut keys = Vec::new();
    while let Some(tx) = getter.next().await.unwrap() {
        keys.push(tx.key);
    }
    assert_eq!(keys.len(), 120);
    assert_eq!(keys[0], "account.000");
    assert_eq!(keys[119], "account.119");

    getter.reset();
    assert_eq!(getter.next().await.unwrap().unwrap().key, "account.000");
}

#[tokio::test(start_paused = true)]
async fn lock_lease_expires() {
    let (connector, _dir) = LocalConnector::new();
    let block_maker = BlockMaker::new(100, Duration::from_secs(5));
    let link = link_to(&connector, "c1", &block_maker);

    let mut a = link.lock("k", Duration::from_secs(10)).unwrap();
    let mut b = link.lock("k", Duration::from_secs(10)).unwrap();
    a.acquire().await.unwrap();
    assert_matches!(
        b.acquire().await,
        Err(RuntimeError::Cocoon(CocoonError::LockAlreadyAcquired))
    );
    a.is_acquirer().await.unwrap();

    tokio::time::advance(Duration::from_secs(11)).await;
    b.acquire().await.unwrap();
    assert_matches!(
        a.is_acquirer().await,
        Err(RuntimeError::Cocoon(CocoonError::LockNotAcquired))
    );
    b.release().await.unwrap();
    a.acquire().await.unwrap();
}

struct Counter;

#[async_trait::async_trait]
impl CocoonCode for Counter {
    async fn init(&self, link: &Link) -> anyhow::Result<()> {
        link.create_ledger(DEFAULT_LEDGER, true, false).await?;
        Ok(())
    }

    async fn invoke(&self, link: &Link, call: Invocation) -> anyhow::Result<serde_json::Value> {
        let params = &call.params;
        match call.function.as_str() {
            "put" => {
                let tx = link.put(&params[0], &params[1]).await?;
                Ok(json!({ "block": tx.block.map(|b| b.number) }))
            }
            "get" => Ok(json!(link.get(&params[0]).await?.value)),
            "whoami" => Ok(json!({ "tx": call.tx_id, "body": call.header.get("Body") })),
            "boom" => panic!("boom"),
            other => anyhow::bail!("unknown function {}", other),
        }
    }
}

struct BrokenInit;

#[async_trait::async_trait]
impl CocoonCode for BrokenInit {
    async fn init(&self, _link: &Link) -> anyhow::Result<()> {
        anyhow::bail!("missing configuration")
    }

    async fn invoke(&self, _link: &Link, _call: Invocation) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::Value::Null)
    }
}

fn runtime_config() -> RuntimeConfig {
    RuntimeConfig {
        cocoon_id: "c1".into(),
        rpc_addr: "127.0.0.1:0".parse().unwrap(),
        block_creation_interval: Duration::from_millis(50),
        init_delay: Duration::from_millis(300),
        ..Default::default()
    }
}

fn invoke(function: &str, params: &[&str]) -> InvokeParams {
    InvokeParams {
        id: "tx1".into(),
        function: function.into(),
        params: params.iter().map(|p| p.to_string()).collect(),
        ..Default::default()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn stub_service_lifecycle() {
    let (connector, _dir) = LocalConnector::new();
    let running = Runtime::new(runtime_config(), Box::new(connector))
        .start(Counter)
        .await
        .unwrap();
    let mut client = StubClient::connect(format!("http://{}", running.local_addr()))
        .await
        .unwrap();

    assert_eq!(client.health_check(Void {}).await.unwrap().into_inner().status, 200);
    let status = client.invoke(invoke("get", &["k"])).await.unwrap_err();
    assert_eq!(CocoonError::from(status), CocoonError::CocoonCodeNotRunning);

    for _ in 0..50 {
        if running.is_running() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(running.is_running());

    let resp = client.invoke(invoke("put", &["k", "v"])).await.unwrap().into_inner();
    assert_eq!(resp.status, 200);
    assert_eq!(resp.id, "tx1");
    let body: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
    assert_eq!(body, json!({ "block": 1 }));

    let resp = client.invoke(invoke("get", &["k"])).await.unwrap().into_inner();
    assert_eq!(resp.body, b"\"v\"".to_vec());

    let mut call = invoke("whoami", &[]);
    call.header.insert("Body".into(), "{\"a\":1}".into());
    let resp = client.invoke(call).await.unwrap().into_inner();
    let body: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
    assert_eq!(body, json!({ "tx": "tx1", "body": "{\"a\":1}" }));

    let resp = client.invoke(invoke("boom", &[])).await.unwrap().into_inner();
    assert_eq!(resp.status, 500);
    assert_eq!(resp.body, b"failed to complete invoke request".to_vec());

    let resp = client.invoke(invoke("nope", &[])).await.unwrap().into_inner();
    assert_eq!(resp.status, 500);
    assert_eq!(resp.body, b"unknown function nope".to_vec());

    client.stop(Void {}).await.unwrap();
    assert_eq!(running.wait().await, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_init_exits_with_code_2() {
    let (connector, _dir) = LocalConnector::new();
    let code = Runtime::new(runtime_config(), Box::new(connector))
        .run(BrokenInit)
        .await
        .unwrap();
    assert_eq!(code, EXIT_INIT_FAILED);
}
